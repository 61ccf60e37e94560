//! In-memory publisher fake (testing only)

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::publisher::RecordPublisher;
use crate::BusError;

/// One captured outbound message.
#[derive(Debug, Clone)]
pub struct PublishedRecord {
    pub subject: String,
    pub headers: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl PublishedRecord {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.payload).unwrap_or(Value::Null)
    }
}

/// Captures published records instead of talking to NATS.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    records: Mutex<Vec<PublishedRecord>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn on_subject(&self, subject: &str) -> Vec<PublishedRecord> {
        self.published()
            .into_iter()
            .filter(|r| r.subject == subject)
            .collect()
    }
}

#[async_trait]
impl RecordPublisher for MemoryPublisher {
    async fn publish(
        &self,
        subject: &str,
        headers: &[(&'static str, String)],
        payload: Vec<u8>,
    ) -> Result<(), BusError> {
        self.records.lock().unwrap().push(PublishedRecord {
            subject: subject.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
            payload,
        });
        Ok(())
    }
}
