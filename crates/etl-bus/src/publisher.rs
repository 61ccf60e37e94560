//! Enriched-record publishing with bounded retry.

use async_trait::async_trait;

use etl_core::metrics::METRICS;
use etl_core::retry::{retry_with, RetryPolicy};

use crate::BusError;

/// Publishing seam for the dispatcher. The production implementation
/// speaks NATS; tests use the in-memory fake.
#[async_trait]
pub trait RecordPublisher: Send + Sync {
    /// Publish a byte-serialized JSON record with structured headers.
    async fn publish(
        &self,
        subject: &str,
        headers: &[(&'static str, String)],
        payload: Vec<u8>,
    ) -> Result<(), BusError>;

    /// Publish a headerless batch; returns how many records made it out.
    /// Per-record failures are skipped, not fatal.
    async fn publish_batch(&self, subject: &str, payloads: Vec<Vec<u8>>) -> usize {
        let mut published = 0;
        for payload in payloads {
            match self.publish(subject, &[], payload).await {
                Ok(()) => published += 1,
                Err(err) => {
                    tracing::error!(subject, error = %err, "skipping record in batch publish");
                }
            }
        }
        published
    }
}

/// Publisher over a shared NATS client session.
///
/// The client reconnects on its own; publish failures get a bounded
/// exponential retry (3 attempts, 1s doubling to a 10s cap) and surface
/// after exhaustion.
pub struct NatsPublisher {
    client: async_nats::Client,
    retry: RetryPolicy,
}

impl NatsPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            retry: RetryPolicy::transient(),
        }
    }
}

#[async_trait]
impl RecordPublisher for NatsPublisher {
    async fn publish(
        &self,
        subject: &str,
        headers: &[(&'static str, String)],
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        let mut header_map = async_nats::HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(*name, value.as_str());
        }

        let count_and_retry = |_: &async_nats::PublishError| {
            METRICS.inc_publish_retries();
            true
        };

        retry_with(self.retry, "nats.publish", count_and_retry, || {
            let headers = header_map.clone();
            let body = payload.clone();
            async move {
                self.client
                    .publish_with_headers(subject.to_string(), headers, body.into())
                    .await
            }
        })
        .await
        .map_err(|e| BusError::Publish(e.to_string()))?;

        tracing::debug!(subject, "published record");
        Ok(())
    }
}
