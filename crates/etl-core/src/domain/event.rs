//! Raw and enriched host event records.
//!
//! Agents publish events on `events.raw` with a millisecond or ISO-8601
//! timestamp and an opaque (possibly doubly base64-encoded) payload. The
//! pipeline normalizes timestamps to milliseconds and never mutates the
//! incoming record: enrichment produces a new value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::EventError;

/// Event timestamp as it appears on the wire.
///
/// Agents send either integer milliseconds since the epoch or an ISO-8601
/// string with a trailing `Z`. Both normalize through [`Timestamp::as_millis`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch.
    Millis(i64),
    /// RFC 3339 / ISO-8601 string.
    Iso(String),
}

impl Timestamp {
    /// Normalize to integer milliseconds since the epoch.
    pub fn as_millis(&self) -> Result<i64, EventError> {
        match self {
            Timestamp::Millis(ms) => Ok(*ms),
            Timestamp::Iso(s) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.timestamp_millis())
                .map_err(|_| EventError::InvalidTimestamp(s.clone())),
        }
    }
}

/// Recognized metadata keys on a raw event. Anything else is carried
/// through untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_sha256: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A raw host event as published by agents on `events.raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Source-unique event identifier.
    pub id: String,
    /// Event kind: `exec`, `connect`, `security`, ...
    #[serde(rename = "type")]
    pub event_type: String,
    /// Originating path or collector.
    pub source: String,
    pub timestamp: Timestamp,
    #[serde(default)]
    pub metadata: EventMetadata,
    /// Opaque payload, possibly doubly base64-encoded JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Parsed payload arguments (`dst_ip`, `dst_port`, ...). Populated by
    /// the dispatcher from `payload` before enrichment.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub args: Map<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RawEvent {
    /// Reject events whose required fields are absent or empty.
    ///
    /// Serde already fails the decode when a key is missing entirely; this
    /// additionally treats empty strings as missing, matching the agents'
    /// contract that `id`, `type`, and `source` are never blank.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.id.is_empty() {
            return Err(EventError::MissingField("id"));
        }
        if self.event_type.is_empty() {
            return Err(EventError::MissingField("type"));
        }
        if self.source.is_empty() {
            return Err(EventError::MissingField("source"));
        }
        Ok(())
    }

    /// Normalized timestamp in milliseconds.
    pub fn timestamp_ms(&self) -> Result<i64, EventError> {
        self.timestamp.as_millis()
    }

    /// `metadata.host_id`, or `"unknown"` for agents that omit it.
    pub fn host_id_or_unknown(&self) -> &str {
        self.metadata.host_id.as_deref().unwrap_or("unknown")
    }
}

/// Fields added by the enricher under `context`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    pub env: String,
    /// Synthetic reverse DNS (`host-<last-octet>.local`), only populated
    /// when fake rDNS is enabled and the destination is a valid IPv4.
    pub rdns: Option<String>,
}

/// A raw event plus its enrichment context. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: RawEvent,
    pub context: EventContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_event_json() -> Value {
        json!({
            "id": "evt-001",
            "type": "connect",
            "source": "/usr/bin/curl",
            "timestamp": 1_700_000_000_000i64,
            "metadata": {"host_id": "web-01", "pid": 4321, "rack": "r7"},
            "payload": "e30="
        })
    }

    #[test]
    fn decodes_millis_timestamp() {
        let ev: RawEvent = serde_json::from_value(sample_event_json()).unwrap();
        assert_eq!(ev.timestamp_ms().unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn decodes_iso_timestamp_to_same_millis() {
        let mut v = sample_event_json();
        v["timestamp"] = json!("2023-11-14T22:13:20Z");
        let ev: RawEvent = serde_json::from_value(v).unwrap();
        assert_eq!(ev.timestamp_ms().unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn iso_with_offset_is_accepted() {
        let mut v = sample_event_json();
        v["timestamp"] = json!("2023-11-14T22:13:20+00:00");
        let ev: RawEvent = serde_json::from_value(v).unwrap();
        assert_eq!(ev.timestamp_ms().unwrap(), 1_700_000_000_000);
    }

    #[test]
    fn garbage_timestamp_is_invalid() {
        let mut v = sample_event_json();
        v["timestamp"] = json!("not-a-date");
        let ev: RawEvent = serde_json::from_value(v).unwrap();
        assert!(ev.timestamp_ms().is_err());
    }

    #[test]
    fn missing_required_field_fails_decode() {
        let mut v = sample_event_json();
        v.as_object_mut().unwrap().remove("source");
        assert!(serde_json::from_value::<RawEvent>(v).is_err());
    }

    #[test]
    fn empty_required_field_fails_validation() {
        let mut v = sample_event_json();
        v["id"] = json!("");
        let ev: RawEvent = serde_json::from_value(v).unwrap();
        assert!(matches!(ev.validate(), Err(EventError::MissingField("id"))));
    }

    #[test]
    fn unknown_keys_survive_round_trip() {
        let mut v = sample_event_json();
        v["fleet"] = json!("blue");
        let ev: RawEvent = serde_json::from_value(v.clone()).unwrap();
        assert_eq!(ev.extra.get("fleet"), Some(&json!("blue")));
        assert_eq!(ev.metadata.extra.get("rack"), Some(&json!("r7")));

        let back = serde_json::to_value(&ev).unwrap();
        assert_eq!(back["fleet"], json!("blue"));
        assert_eq!(back["metadata"]["rack"], json!("r7"));
    }
}
