//! Neo4j writer for the communication graph.
//!
//! Maintains Host / NetworkEndpoint nodes with an idempotent
//! `COMMUNICATES` edge carrying a rolling counter, and projects enriched
//! events into Event / User / Process / Container observation nodes.

use async_trait::async_trait;
use neo4rs::{query, Graph};
use tracing::{debug, info, instrument};

use etl_core::domain::EnrichedEvent;
use etl_core::endpoint::split_endpoint_id;
use etl_core::payload::extract_destination;
use etl_core::retry::{retry_with, RetryPolicy};
use etl_core::{derive_dst_host_id, Neo4jConfig};

use crate::error::{StoreError, StoreResult};
use crate::schema::NEO4J_SCHEMA;
use crate::store_traits::GraphStore;

const COMM_EDGE_TO_ENDPOINT: &str = r#"
    MERGE (a:Host {host_id: $src})
    MERGE (b:NetworkEndpoint {endpoint_id: $dst})
    SET b.ip = $ip, b.port = $port
    MERGE (a)-[r:COMMUNICATES]->(b)
    ON CREATE SET r.count_1h = 1, r.last_seen = timestamp()
    ON MATCH SET r.count_1h = coalesce(r.count_1h, 0) + 1, r.last_seen = timestamp()
"#;

const COMM_EDGE_TO_HOST: &str = r#"
    MERGE (a:Host {host_id: $src})
    MERGE (b:Host {host_id: $dst})
    MERGE (a)-[r:COMMUNICATES]->(b)
    ON CREATE SET r.count_1h = 1, r.last_seen = timestamp()
    ON MATCH SET r.count_1h = coalesce(r.count_1h, 0) + 1, r.last_seen = timestamp()
"#;

const EVENT_NODE: &str = r#"
    MERGE (e:Event {id: $event_id})
    SET e.type = $type,
        e.source = $source,
        e.timestamp = $timestamp,
        e.env = $env,
        e.rdns = $rdns,
        e.metadata = $metadata,
        e.payload = $payload,
        e.created_at = datetime()
"#;

// Nodes are bound before the edge MERGE so re-processing an event can
// never duplicate the Event node through a partial pattern match.
const HOST_GENERATED: &str = r#"
    MERGE (h:Host {host_id: $host_id})
    SET h.rdns = $rdns, h.env = $env, h.last_seen = datetime()
    WITH h
    MATCH (e:Event {id: $event_id})
    MERGE (h)-[:GENERATED]->(e)
"#;

const USER_EXECUTED: &str = r#"
    MERGE (u:User {uid: $uid})
    SET u.last_seen = datetime()
    WITH u
    MATCH (e:Event {id: $event_id})
    MERGE (u)-[:EXECUTED]->(e)
"#;

const PROCESS_EXECUTED: &str = r#"
    MERGE (p:Process {pid: $pid, host_id: $host_id})
    SET p.binary_path = $binary_path, p.last_seen = datetime()
    WITH p
    MATCH (e:Event {id: $event_id})
    MERGE (p)-[:EXECUTED]->(e)
"#;

const CONTAINER_GENERATED: &str = r#"
    MERGE (c:Container {container_id: $container_id})
    SET c.last_seen = datetime()
    WITH c
    MATCH (e:Event {id: $event_id})
    MERGE (c)-[:GENERATED]->(e)
"#;

/// Writer for storing events and relationships in Neo4j.
pub struct Neo4jWriter {
    graph: Graph,
    retry: RetryPolicy,
}

impl Neo4jWriter {
    /// Connect, verify connectivity, and bootstrap constraints/indexes.
    #[instrument(skip_all, fields(uri = %config.uri))]
    pub async fn connect(config: &Neo4jConfig) -> StoreResult<Self> {
        let graph = Graph::new(config.uri.as_str(), config.user.as_str(), config.password.as_str())
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        graph
            .run(query("RETURN 1"))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        info!("connected to Neo4j");

        for stmt in NEO4J_SCHEMA {
            graph
                .run(query(stmt))
                .await
                .map_err(|e| StoreError::SchemaSetup(e.to_string()))?;
        }
        info!("Neo4j schema initialized");

        Ok(Self {
            graph,
            retry: RetryPolicy::transient(),
        })
    }

    async fn write_event_nodes(&self, event: &EnrichedEvent) -> Result<(), neo4rs::Error> {
        let raw = &event.event;
        let ts_ms = raw.timestamp_ms().unwrap_or_default();
        let metadata_json =
            serde_json::to_string(&raw.metadata).unwrap_or_else(|_| "{}".to_string());

        self.graph
            .run(
                query(EVENT_NODE)
                    .param("event_id", raw.id.as_str())
                    .param("type", raw.event_type.as_str())
                    .param("source", raw.source.as_str())
                    .param("timestamp", ts_ms)
                    .param("env", event.context.env.as_str())
                    .param("rdns", event.context.rdns.clone().unwrap_or_default())
                    .param("metadata", metadata_json)
                    .param("payload", raw.payload.clone().unwrap_or_default()),
            )
            .await?;

        if let Some(host_id) = raw.metadata.host_id.as_deref() {
            self.graph
                .run(
                    query(HOST_GENERATED)
                        .param("host_id", host_id)
                        .param("rdns", event.context.rdns.clone().unwrap_or_default())
                        .param("env", event.context.env.as_str())
                        .param("event_id", raw.id.as_str()),
                )
                .await?;
        }

        if raw.event_type == "exec" {
            if let Some(uid) = raw.metadata.uid {
                self.graph
                    .run(
                        query(USER_EXECUTED)
                            .param("uid", uid)
                            .param("event_id", raw.id.as_str()),
                    )
                    .await?;
            }
        }

        if let Some(pid) = raw.metadata.pid {
            self.graph
                .run(
                    query(PROCESS_EXECUTED)
                        .param("pid", pid)
                        .param("host_id", raw.host_id_or_unknown())
                        .param("binary_path", raw.source.as_str())
                        .param("event_id", raw.id.as_str()),
                )
                .await?;
        }

        if let Some(container_id) = raw.metadata.container_id.as_deref() {
            self.graph
                .run(
                    query(CONTAINER_GENERATED)
                        .param("container_id", container_id)
                        .param("event_id", raw.id.as_str()),
                )
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl GraphStore for Neo4jWriter {
    #[instrument(skip(self))]
    async fn upsert_comm_edge(&self, src_host_id: &str, dst_host_id: &str) -> StoreResult<()> {
        // Bolt connections surface most faults as generic errors, so every
        // failure gets the transient budget.
        retry_with(self.retry, "neo4j.upsert_comm_edge", |_| true, || async {
            if let Some((ip, port)) = split_endpoint_id(dst_host_id) {
                self.graph
                    .run(
                        query(COMM_EDGE_TO_ENDPOINT)
                            .param("src", src_host_id)
                            .param("dst", dst_host_id)
                            .param("ip", ip)
                            .param("port", port as i64),
                    )
                    .await
            } else {
                self.graph
                    .run(
                        query(COMM_EDGE_TO_HOST)
                            .param("src", src_host_id)
                            .param("dst", dst_host_id),
                    )
                    .await
            }
        })
        .await?;

        debug!(src = src_host_id, dst = dst_host_id, "upserted communication edge");
        Ok(())
    }

    #[instrument(skip(self, event), fields(event_id = %event.event.id))]
    async fn write_event(&self, event: &EnrichedEvent) -> StoreResult<()> {
        retry_with(self.retry, "neo4j.write_event", |_| true, || {
            self.write_event_nodes(event)
        })
        .await?;

        if event.event.event_type == "connect" {
            if let Some((dst_ip, dst_port)) = extract_destination(&event.event.args) {
                let dst_host_id = derive_dst_host_id(&dst_ip, dst_port);
                self.upsert_comm_edge(event.event.host_id_or_unknown(), &dst_host_id)
                    .await?;
            }
        }

        debug!(event_id = %event.event.id, "written event to Neo4j");
        Ok(())
    }

    async fn close(&self) {
        // neo4rs has no explicit close; connections are released on drop.
        info!("closed Neo4j connection");
    }
}
