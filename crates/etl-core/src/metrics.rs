//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single `tracing::info!`
//! event (the supervisor does this on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    payload_decode_failures: AtomicU64,
    join_records_emitted: AtomicU64,
    join_records_deduped: AtomicU64,
    store_write_failures: AtomicU64,
    publish_retries: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_processed: AtomicU64::new(0),
            events_dropped: AtomicU64::new(0),
            payload_decode_failures: AtomicU64::new(0),
            join_records_emitted: AtomicU64::new(0),
            join_records_deduped: AtomicU64::new(0),
            store_write_failures: AtomicU64::new(0),
            publish_retries: AtomicU64::new(0),
        }
    }

    pub fn inc_events_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_events_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A payload failed both base64 decode paths. The handler falls back
    /// to empty args, so this counter is the only trace such payloads leave.
    pub fn inc_payload_decode_failures(&self) {
        self.payload_decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_join_records_emitted(&self) {
        self.join_records_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_join_records_deduped(&self) {
        self.join_records_deduped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_store_write_failures(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_publish_retries(&self) {
        self.publish_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn events_dropped(&self) -> u64 {
        self.events_dropped.load(Ordering::Relaxed)
    }

    pub fn payload_decode_failures(&self) -> u64 {
        self.payload_decode_failures.load(Ordering::Relaxed)
    }

    pub fn join_records_emitted(&self) -> u64 {
        self.join_records_emitted.load(Ordering::Relaxed)
    }

    pub fn join_records_deduped(&self) -> u64 {
        self.join_records_deduped.load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_processed = self.events_processed.load(Ordering::Relaxed),
            events_dropped = self.events_dropped.load(Ordering::Relaxed),
            payload_decode_failures = self.payload_decode_failures.load(Ordering::Relaxed),
            join_records_emitted = self.join_records_emitted.load(Ordering::Relaxed),
            join_records_deduped = self.join_records_deduped.load(Ordering::Relaxed),
            store_write_failures = self.store_write_failures.load(Ordering::Relaxed),
            publish_retries = self.publish_retries.load(Ordering::Relaxed),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let m = Metrics::new();
        m.inc_events_processed();
        m.inc_events_processed();
        m.inc_payload_decode_failures();
        assert_eq!(m.events_processed(), 2);
        assert_eq!(m.payload_decode_failures(), 1);
        assert_eq!(m.events_dropped(), 0);
    }
}
