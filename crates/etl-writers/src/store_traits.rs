//! Store trait definitions for the enrichment pipeline.
//!
//! Two seams, both async and backend-agnostic:
//! - `EventStore`: time-series persistence of raw and enriched events
//! - `GraphStore`: host/endpoint communication graph projection
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use async_trait::async_trait;
use etl_core::domain::EnrichedEvent;
use serde_json::Value;

use crate::error::StoreResult;

/// Time-series event persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a raw event row keyed `(ts, host_id, event_type)`.
    async fn write_raw_event(
        &self,
        ts_ms: i64,
        host_id: &str,
        event_type: &str,
        payload_json: &Value,
    ) -> StoreResult<()>;

    /// Upsert an enriched event on its natural key.
    async fn write_enriched_event(&self, event: &EnrichedEvent) -> StoreResult<()>;

    /// Upsert a batch; returns the number written. Per-record failures
    /// are skipped, not fatal.
    async fn write_enriched_batch(&self, events: &[EnrichedEvent]) -> usize {
        let mut written = 0;
        for event in events {
            match self.write_enriched_event(event).await {
                Ok(()) => written += 1,
                Err(err) => {
                    tracing::error!(event_id = %event.event.id, error = %err,
                        "skipping enriched event in batch");
                }
            }
        }
        written
    }

    /// Best-effort close; never raises.
    async fn close(&self);
}

/// Communication-graph persistence.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensure both endpoints and a `COMMUNICATES` edge exist, bumping
    /// `count_1h` and `last_seen`.
    async fn upsert_comm_edge(&self, src_host_id: &str, dst_host_id: &str) -> StoreResult<()>;

    /// Upsert the event node and its relationships (host, user, process,
    /// container), plus the communication edge for connect events.
    async fn write_event(&self, event: &EnrichedEvent) -> StoreResult<()>;

    /// Best-effort close; never raises.
    async fn close(&self);
}
