//! NATS plumbing for the AegisFlux ETL pipeline.
//!
//! Subject names, header names, bounded-retry connection establishment,
//! and the enriched-record publisher.

pub mod fakes;
pub mod publisher;

use etl_core::retry::{retry_with, RetryPolicy};
use thiserror::Error;

/// Subjects consumed and produced by the pipeline.
pub mod subjects {
    /// Raw host events from agents.
    pub const RAW_EVENTS: &str = "events.raw";
    /// CVE descriptors from the feed services.
    pub const CVE_UPDATES: &str = "feeds.cve.updates";
    /// Per-host package-to-CVE candidate mappings.
    pub const PKG_CVE_MAPPINGS: &str = "feeds.pkg.cve";
    /// Enriched raw events (outbound, and optional replay inbound).
    pub const ENRICHED_EVENTS: &str = "events.enriched";
    /// Risk-scored package/CVE join records (outbound).
    pub const ETL_ENRICHED: &str = "etl.enriched";

    /// Queue group for load-balancing raw event consumption.
    pub const ETL_QUEUE_GROUP: &str = "etl";
}

/// Structured header names on outbound messages.
pub mod headers {
    pub const X_HOST_ID: &str = "x-host-id";
    pub const X_EVENT_TYPE: &str = "x-event-type";
    pub const X_TIMESTAMP: &str = "x-timestamp";
    pub const X_PACKAGE: &str = "x-package";
    pub const X_CVE_ID: &str = "x-cve-id";
    pub const X_ENRICHED: &str = "x-enriched";
}

/// Errors from the bus layer.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connect(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Connect to NATS with a bounded retry (5 attempts, doubling wait).
pub async fn connect(url: &str) -> Result<async_nats::Client, BusError> {
    let client = retry_with(RetryPolicy::connect(), "nats.connect", |_| true, || {
        async_nats::connect(url)
    })
    .await
    .map_err(|e| BusError::Connect(e.to_string()))?;

    tracing::info!(url, "connected to NATS");
    Ok(client)
}

pub use publisher::{NatsPublisher, RecordPublisher};
