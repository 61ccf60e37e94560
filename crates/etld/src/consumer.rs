//! Subject dispatcher: subscribes to the inbound subjects, bounds inflight
//! work with a semaphore, and routes each message through its handler
//! under a per-message deadline.
//!
//! Delivery is at-most-once by design: a message completes ("acks") when
//! its handler returns, errors, or hits the deadline. Reprocessing raw
//! events would duplicate graph edges and join emissions, so nothing is
//! ever redelivered on failure.
//!
//! Raw event stages run independently: a failing store write logs and the
//! message continues through the remaining stages.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use etl_bus::{headers, subjects, RecordPublisher};
use etl_core::domain::{CveDescriptor, EnrichedEvent, EnrichedJoinRecord, PkgCveMapping, RawEvent};
use etl_core::payload::{connect_args, extract_destination};
use etl_core::{derive_dst_host_id, enrich_event, validate_enriched, Config, JoinCache, METRICS};
use etl_writers::{EventStore, GraphStore};

/// Handler a subject routes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    RawEvent,
    CveUpdate,
    PkgCveMapping,
    EnrichedReplay,
}

/// Routing table: subject -> handler.
pub fn route_for(subject: &str) -> Option<Route> {
    match subject {
        subjects::RAW_EVENTS => Some(Route::RawEvent),
        subjects::CVE_UPDATES => Some(Route::CveUpdate),
        subjects::PKG_CVE_MAPPINGS => Some(Route::PkgCveMapping),
        subjects::ENRICHED_EVENTS => Some(Route::EnrichedReplay),
        _ => None,
    }
}

/// Message handlers with their injected collaborators.
///
/// Separated from the subscription loop so the full pipeline is testable
/// against the in-memory store and publisher fakes.
pub struct Handlers {
    publisher: Arc<dyn RecordPublisher>,
    events: Arc<dyn EventStore>,
    graph: Arc<dyn GraphStore>,
    join_cache: Arc<JoinCache>,
    env: String,
    fake_rdns: bool,
}

impl Handlers {
    pub fn new(
        publisher: Arc<dyn RecordPublisher>,
        events: Arc<dyn EventStore>,
        graph: Arc<dyn GraphStore>,
        join_cache: Arc<JoinCache>,
        env: String,
        fake_rdns: bool,
    ) -> Self {
        Self {
            publisher,
            events,
            graph,
            join_cache,
            env,
            fake_rdns,
        }
    }

    pub async fn dispatch(&self, route: Route, data: &[u8]) {
        match route {
            Route::RawEvent => self.handle_raw_event(data).await,
            Route::CveUpdate => self.handle_cve_update(data).await,
            Route::PkgCveMapping => self.handle_pkg_cve_mapping(data).await,
            Route::EnrichedReplay => self.handle_enriched_replay(data).await,
        }
    }

    /// `events.raw`: decode, validate, persist, project, enrich, publish.
    async fn handle_raw_event(&self, data: &[u8]) {
        // Decoded
        let value: Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(err) => {
                warn!(subject = subjects::RAW_EVENTS, error = %err, "dropping undecodable event");
                METRICS.inc_events_dropped();
                return;
            }
        };

        // Validated
        let mut event: RawEvent = match serde_json::from_value(value) {
            Ok(ev) => ev,
            Err(err) => {
                warn!(subject = subjects::RAW_EVENTS, error = %err, "dropping event with missing required fields");
                METRICS.inc_events_dropped();
                return;
            }
        };
        if let Err(err) = event.validate() {
            warn!(subject = subjects::RAW_EVENTS, error = %err, "dropping invalid event");
            METRICS.inc_events_dropped();
            return;
        }
        let ts_ms = match event.timestamp_ms() {
            Ok(ts) => ts,
            Err(err) => {
                warn!(event_id = %event.id, error = %err, "dropping event with unparseable timestamp");
                METRICS.inc_events_dropped();
                return;
            }
        };

        let host_id = event.host_id_or_unknown().to_string();
        let event_id = event.id.clone();
        debug!(host_id, event_id, event_type = %event.event_type, "processing event");

        // Persisted. A raw-write failure must not block the later stages.
        match serde_json::to_value(&event) {
            Ok(payload_json) => {
                if let Err(err) = self
                    .events
                    .write_raw_event(ts_ms, &host_id, &event.event_type, &payload_json)
                    .await
                {
                    error!(host_id, event_id, error = %err, "failed to write raw event");
                    METRICS.inc_store_write_failures();
                }
            }
            Err(err) => error!(event_id, error = %err, "failed to serialize raw event"),
        }

        // Payload args feed both the graph projection and the enricher.
        event.args = connect_args(event.payload.as_deref());

        // Projected
        if event.event_type == "connect" {
            match extract_destination(&event.args) {
                Some((dst_ip, dst_port)) => {
                    let dst_host_id = derive_dst_host_id(&dst_ip, dst_port);
                    if let Err(err) = self.graph.upsert_comm_edge(&host_id, &dst_host_id).await {
                        error!(host_id, event_id, dst_host_id, error = %err,
                            "failed to upsert communication edge");
                        METRICS.inc_store_write_failures();
                    }
                }
                None => debug!(event_id, "connect event without destination args"),
            }
        }

        // Enriched
        let enriched = enrich_event(&event, &self.env, self.fake_rdns);

        // Published
        match serde_json::to_vec(&enriched) {
            Ok(body) => {
                let message_headers = [
                    (headers::X_HOST_ID, host_id.clone()),
                    (headers::X_EVENT_TYPE, event.event_type.clone()),
                    (headers::X_TIMESTAMP, ts_ms.to_string()),
                    (headers::X_ENRICHED, "true".to_string()),
                ];
                if let Err(err) = self
                    .publisher
                    .publish(subjects::ENRICHED_EVENTS, &message_headers, body)
                    .await
                {
                    error!(host_id, event_id, error = %err, "failed to publish enriched event");
                }
            }
            Err(err) => error!(event_id, error = %err, "failed to serialize enriched event"),
        }

        // Enriched persistence is best-effort like every other stage.
        if let Err(err) = self.events.write_enriched_event(&enriched).await {
            error!(host_id, event_id, error = %err, "failed to write enriched event");
            METRICS.inc_store_write_failures();
        }

        METRICS.inc_events_processed();
    }

    /// `feeds.cve.updates`: cache the descriptor and drain pending joins.
    async fn handle_cve_update(&self, data: &[u8]) {
        let cve: CveDescriptor = match serde_json::from_slice(data) {
            Ok(c) => c,
            Err(err) => {
                warn!(subject = subjects::CVE_UPDATES, error = %err, "dropping undecodable CVE update");
                return;
            }
        };

        info!(cve_id = %cve.cve_id, "cached CVE update");
        let records = self.join_cache.insert_cve(cve);
        self.publish_join_records(records).await;
    }

    /// `feeds.pkg.cve`: cache the mapping and emit immediate joins.
    async fn handle_pkg_cve_mapping(&self, data: &[u8]) {
        let mapping: PkgCveMapping = match serde_json::from_slice(data) {
            Ok(m) => m,
            Err(err) => {
                warn!(subject = subjects::PKG_CVE_MAPPINGS, error = %err,
                    "dropping undecodable package CVE mapping");
                return;
            }
        };

        info!(
            host_id = %mapping.host_id,
            package = %mapping.package.name,
            candidates = mapping.candidates.len(),
            "received package CVE mapping"
        );
        let records = self.join_cache.insert_mapping(mapping);
        self.publish_join_records(records).await;
    }

    /// `events.enriched` replay: validate and re-persist into both stores.
    async fn handle_enriched_replay(&self, data: &[u8]) {
        let value: Value = match serde_json::from_slice(data) {
            Ok(v) => v,
            Err(err) => {
                warn!(subject = subjects::ENRICHED_EVENTS, error = %err,
                    "dropping undecodable replay record");
                METRICS.inc_events_dropped();
                return;
            }
        };
        if !validate_enriched(&value) {
            warn!(subject = subjects::ENRICHED_EVENTS, "dropping replay record without context.env");
            METRICS.inc_events_dropped();
            return;
        }
        let enriched: EnrichedEvent = match serde_json::from_value(value) {
            Ok(e) => e,
            Err(err) => {
                warn!(subject = subjects::ENRICHED_EVENTS, error = %err,
                    "dropping malformed replay record");
                METRICS.inc_events_dropped();
                return;
            }
        };

        if let Err(err) = self.events.write_enriched_event(&enriched).await {
            error!(event_id = %enriched.event.id, error = %err, "failed to re-persist replay record");
            METRICS.inc_store_write_failures();
        }
        if let Err(err) = self.graph.write_event(&enriched).await {
            error!(event_id = %enriched.event.id, error = %err, "failed to project replay record");
            METRICS.inc_store_write_failures();
        }
    }

    async fn publish_join_records(&self, records: Vec<EnrichedJoinRecord>) {
        for record in records {
            let message_headers = [
                (headers::X_HOST_ID, record.host_id.clone()),
                (headers::X_PACKAGE, record.package.name.clone()),
                (headers::X_CVE_ID, record.cve_candidate.cve_id.clone()),
                (headers::X_ENRICHED, "true".to_string()),
            ];
            let body = match serde_json::to_vec(&record) {
                Ok(b) => b,
                Err(err) => {
                    error!(cve_id = %record.cve_candidate.cve_id, error = %err,
                        "failed to serialize join record");
                    continue;
                }
            };
            match self
                .publisher
                .publish(subjects::ETL_ENRICHED, &message_headers, body)
                .await
            {
                Ok(()) => info!(
                    host_id = %record.host_id,
                    cve_id = %record.cve_candidate.cve_id,
                    risk_level = %record.enrichment.risk_level,
                    "published enriched package CVE record"
                ),
                Err(err) => error!(
                    host_id = %record.host_id,
                    cve_id = %record.cve_candidate.cve_id,
                    error = %err,
                    "failed to publish join record"
                ),
            }
        }
    }
}

/// Subscription driver: one pump task per subject, a shared semaphore
/// bounding inflight handlers, and a cancellation token observed at every
/// suspension point.
pub struct Dispatcher {
    client: async_nats::Client,
    handlers: Arc<Handlers>,
    semaphore: Arc<Semaphore>,
    deadline: Duration,
    max_inflight: usize,
    replay_enriched: bool,
}

impl Dispatcher {
    pub fn new(client: async_nats::Client, handlers: Arc<Handlers>, config: &Config) -> Self {
        Self {
            client,
            handlers,
            semaphore: Arc::new(Semaphore::new(config.max_inflight)),
            deadline: config.processing_timeout,
            max_inflight: config.max_inflight,
            replay_enriched: config.replay_enriched,
        }
    }

    /// Subscribe and process until cancellation, then drain inflight work.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut pumps = JoinSet::new();

        let raw_sub = self
            .client
            .queue_subscribe(
                subjects::RAW_EVENTS.to_string(),
                subjects::ETL_QUEUE_GROUP.to_string(),
            )
            .await?;
        info!(subject = subjects::RAW_EVENTS, queue_group = subjects::ETL_QUEUE_GROUP, "subscribed");
        pumps.spawn(Self::pump(
            self.handlers.clone(),
            self.semaphore.clone(),
            self.deadline,
            Route::RawEvent,
            raw_sub,
            cancel.clone(),
        ));

        let mut plain = vec![
            (Route::CveUpdate, subjects::CVE_UPDATES),
            (Route::PkgCveMapping, subjects::PKG_CVE_MAPPINGS),
        ];
        if self.replay_enriched {
            plain.push((Route::EnrichedReplay, subjects::ENRICHED_EVENTS));
        }
        for (route, subject) in plain {
            let sub = self.client.subscribe(subject.to_string()).await?;
            info!(subject, "subscribed");
            pumps.spawn(Self::pump(
                self.handlers.clone(),
                self.semaphore.clone(),
                self.deadline,
                route,
                sub,
                cancel.clone(),
            ));
        }

        while pumps.join_next().await.is_some() {}

        // Give inflight handlers a bounded window to finish.
        match tokio::time::timeout(
            Duration::from_secs(5),
            self.semaphore.acquire_many(self.max_inflight as u32),
        )
        .await
        {
            Ok(Ok(_permits)) => info!("all inflight messages drained"),
            _ => warn!("drain window elapsed with messages still inflight"),
        }
        Ok(())
    }

    async fn pump(
        handlers: Arc<Handlers>,
        semaphore: Arc<Semaphore>,
        deadline: Duration,
        route: Route,
        mut sub: async_nats::Subscriber,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sub.unsubscribe().await;
                    break;
                }
                next = sub.next() => {
                    let Some(msg) = next else { break };
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => break,
                        acquired = semaphore.clone().acquire_owned() => match acquired {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let handlers = handlers.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if tokio::time::timeout(deadline, handlers.dispatch(route, &msg.payload))
                            .await
                            .is_err()
                        {
                            error!(subject = %msg.subject, "message processing deadline exceeded");
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table_covers_all_subjects() {
        assert_eq!(route_for("events.raw"), Some(Route::RawEvent));
        assert_eq!(route_for("feeds.cve.updates"), Some(Route::CveUpdate));
        assert_eq!(route_for("feeds.pkg.cve"), Some(Route::PkgCveMapping));
        assert_eq!(route_for("events.enriched"), Some(Route::EnrichedReplay));
        assert_eq!(route_for("feeds.unknown"), None);
    }
}
