//! In-memory fakes for the store traits (testing only)
//!
//! `MemoryEventStore` and `MemoryGraphStore` satisfy the trait contracts
//! without external services. The graph fake keeps real edge counters and
//! a logical clock so idempotence and monotonicity are observable; the
//! event fake supports failure injection for partial-failure tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use etl_core::domain::EnrichedEvent;
use etl_core::payload::extract_destination;
use etl_core::derive_dst_host_id;

use crate::error::{StoreError, StoreResult};
use crate::store_traits::{EventStore, GraphStore};

// ---------------------------------------------------------------------------
// MemoryEventStore
// ---------------------------------------------------------------------------

/// One captured raw-event row.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub ts_ms: i64,
    pub host_id: String,
    pub event_type: String,
    pub payload_json: Value,
}

/// In-memory time-series store.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    raw: Mutex<Vec<RawRow>>,
    enriched: Mutex<Vec<EnrichedEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail, for degraded-downstream tests.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw_rows(&self) -> Vec<RawRow> {
        self.raw.lock().unwrap().clone()
    }

    pub fn enriched_events(&self) -> Vec<EnrichedEvent> {
        self.enriched.lock().unwrap().clone()
    }

    fn check_failure(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Query("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn write_raw_event(
        &self,
        ts_ms: i64,
        host_id: &str,
        event_type: &str,
        payload_json: &Value,
    ) -> StoreResult<()> {
        self.check_failure()?;
        self.raw.lock().unwrap().push(RawRow {
            ts_ms,
            host_id: host_id.to_string(),
            event_type: event_type.to_string(),
            payload_json: payload_json.clone(),
        });
        Ok(())
    }

    async fn write_enriched_event(&self, event: &EnrichedEvent) -> StoreResult<()> {
        self.check_failure()?;
        let mut enriched = self.enriched.lock().unwrap();
        // Upsert on the event id, mirroring the real writer.
        if let Some(existing) = enriched.iter_mut().find(|e| e.event.id == event.event.id) {
            *existing = event.clone();
        } else {
            enriched.push(event.clone());
        }
        Ok(())
    }

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// MemoryGraphStore
// ---------------------------------------------------------------------------

/// State of one `COMMUNICATES` edge in the fake graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommEdge {
    pub count_1h: u64,
    /// Logical clock tick of the last upsert; strictly increasing.
    pub last_seen: u64,
}

/// In-memory communication graph.
#[derive(Debug, Default)]
pub struct MemoryGraphStore {
    edges: Mutex<HashMap<(String, String), CommEdge>>,
    events: Mutex<Vec<EnrichedEvent>>,
    clock: AtomicU64,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(&self, src: &str, dst: &str) -> Option<CommEdge> {
        self.edges
            .lock()
            .unwrap()
            .get(&(src.to_string(), dst.to_string()))
            .copied()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.lock().unwrap().len()
    }

    pub fn written_events(&self) -> Vec<EnrichedEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_comm_edge(&self, src_host_id: &str, dst_host_id: &str) -> StoreResult<()> {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst) + 1;
        let mut edges = self.edges.lock().unwrap();
        let edge = edges
            .entry((src_host_id.to_string(), dst_host_id.to_string()))
            .or_insert(CommEdge {
                count_1h: 0,
                last_seen: 0,
            });
        edge.count_1h += 1;
        edge.last_seen = tick;
        Ok(())
    }

    async fn write_event(&self, event: &EnrichedEvent) -> StoreResult<()> {
        self.events.lock().unwrap().push(event.clone());

        if event.event.event_type == "connect" {
            if let Some((dst_ip, dst_port)) = extract_destination(&event.event.args) {
                let dst_host_id = derive_dst_host_id(&dst_ip, dst_port);
                self.upsert_comm_edge(event.event.host_id_or_unknown(), &dst_host_id)
                    .await?;
            }
        }
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn repeated_edge_upserts_increment_and_advance() {
        let graph = MemoryGraphStore::new();
        graph.upsert_comm_edge("web-01", "ip:8.8.8.8:53").await.unwrap();
        let first = graph.edge("web-01", "ip:8.8.8.8:53").unwrap();
        graph.upsert_comm_edge("web-01", "ip:8.8.8.8:53").await.unwrap();
        let second = graph.edge("web-01", "ip:8.8.8.8:53").unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(first.count_1h, 1);
        assert_eq!(second.count_1h, 2);
        assert!(second.last_seen > first.last_seen);
    }

    #[tokio::test]
    async fn enriched_writes_upsert_on_id() {
        let store = MemoryEventStore::new();
        let mut event: EnrichedEvent = serde_json::from_value(json!({
            "id": "evt-1", "type": "exec", "source": "/bin/sh",
            "timestamp": 1_700_000_000_000i64,
            "context": {"env": "dev", "rdns": null}
        }))
        .unwrap();

        store.write_enriched_event(&event).await.unwrap();
        event.context.env = "prod".to_string();
        store.write_enriched_event(&event).await.unwrap();

        let events = store.enriched_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].context.env, "prod");
    }

    #[tokio::test]
    async fn enriched_batch_reports_written_count() {
        let store = MemoryEventStore::new();
        let events: Vec<EnrichedEvent> = (0..3)
            .map(|i| {
                serde_json::from_value(json!({
                    "id": format!("evt-{i}"), "type": "exec", "source": "/bin/sh",
                    "timestamp": 1_700_000_000_000i64,
                    "context": {"env": "dev", "rdns": null}
                }))
                .unwrap()
            })
            .collect();

        assert_eq!(store.write_enriched_batch(&events).await, 3);
        assert_eq!(store.enriched_events().len(), 3);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_store_errors() {
        let store = MemoryEventStore::new();
        store.set_fail_writes(true);
        let result = store
            .write_raw_event(0, "h", "exec", &json!({}))
            .await;
        assert!(result.is_err());
        assert!(store.raw_rows().is_empty());
    }
}
