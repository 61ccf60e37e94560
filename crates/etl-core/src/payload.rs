//! Connect-event payload decoding.
//!
//! The ingest service base64-encodes the JSON args object, and some agent
//! versions encode it twice. The decode order is therefore: double base64
//! then JSON, falling back to single base64 then JSON, falling back to
//! empty args. Failures are deliberately silent on the event path but
//! counted in [`METRICS`](crate::metrics::METRICS) so they stay observable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::metrics::METRICS;

fn as_args_object(bytes: &[u8]) -> Option<Map<String, Value>> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Decode a payload into its args object, or `None` when no decode path
/// succeeds.
pub fn decode_payload_args(payload: &str) -> Option<Map<String, Value>> {
    let first = BASE64.decode(payload.trim()).ok()?;

    // Double-encoded: the first decode yields another base64 string.
    if let Ok(inner) = std::str::from_utf8(&first) {
        if let Ok(second) = BASE64.decode(inner.trim()) {
            if let Some(args) = as_args_object(&second) {
                return Some(args);
            }
        }
    }

    as_args_object(&first)
}

/// Decode `payload` into args, counting failures and falling back to an
/// empty map. The payload may itself wrap the args under an `"args"` key.
pub fn connect_args(payload: Option<&str>) -> Map<String, Value> {
    let Some(payload) = payload else {
        return Map::new();
    };
    match decode_payload_args(payload) {
        Some(map) => match map.get("args") {
            Some(Value::Object(inner)) => inner.clone(),
            _ => map,
        },
        None => {
            METRICS.inc_payload_decode_failures();
            Map::new()
        }
    }
}

/// Pull `(dst_ip, dst_port)` out of decoded args. A missing port defaults
/// to 0; a missing ip means the event carries no destination.
pub fn extract_destination(args: &Map<String, Value>) -> Option<(String, u16)> {
    let dst_ip = args.get("dst_ip")?.as_str()?.to_string();
    let dst_port = args
        .get("dst_port")
        .and_then(Value::as_u64)
        .and_then(|p| u16::try_from(p).ok())
        .unwrap_or(0);
    Some((dst_ip, dst_port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn b64(data: &[u8]) -> String {
        BASE64.encode(data)
    }

    #[test]
    fn single_encoded_payload_decodes() {
        let payload = b64(br#"{"dst_ip":"8.8.8.8","dst_port":53}"#);
        let args = decode_payload_args(&payload).unwrap();
        assert_eq!(args["dst_ip"], json!("8.8.8.8"));
    }

    #[test]
    fn double_encoded_payload_decodes() {
        let inner = b64(br#"{"dst_ip":"10.0.0.5","dst_port":22}"#);
        let payload = b64(inner.as_bytes());
        let args = decode_payload_args(&payload).unwrap();
        assert_eq!(args["dst_ip"], json!("10.0.0.5"));
        assert_eq!(args["dst_port"], json!(22));
    }

    #[test]
    fn double_and_single_paths_agree() {
        let raw = br#"{"dst_ip":"1.2.3.4","dst_port":443}"#;
        let single = b64(raw);
        let double = b64(single.as_bytes());
        assert_eq!(decode_payload_args(&single), decode_payload_args(&double));
    }

    #[test]
    fn args_may_be_nested_under_args_key() {
        let payload = b64(br#"{"args":{"dst_ip":"8.8.4.4","dst_port":53}}"#);
        let args = connect_args(Some(&payload));
        assert_eq!(extract_destination(&args), Some(("8.8.4.4".to_string(), 53)));
    }

    #[test]
    fn undecodable_payload_falls_back_to_empty_args() {
        let before = METRICS.payload_decode_failures();
        let args = connect_args(Some("!!not-base64!!"));
        assert!(args.is_empty());
        assert!(METRICS.payload_decode_failures() > before);
    }

    #[test]
    fn base64_of_non_json_is_counted() {
        let payload = b64(b"plain text, not json");
        let before = METRICS.payload_decode_failures();
        assert!(connect_args(Some(&payload)).is_empty());
        assert!(METRICS.payload_decode_failures() > before);
    }

    #[test]
    fn missing_port_defaults_to_zero() {
        let mut args = Map::new();
        args.insert("dst_ip".to_string(), json!("9.9.9.9"));
        assert_eq!(extract_destination(&args), Some(("9.9.9.9".to_string(), 0)));
    }

    #[test]
    fn missing_ip_means_no_destination() {
        let mut args = Map::new();
        args.insert("dst_port".to_string(), json!(80));
        assert_eq!(extract_destination(&args), None);
    }
}
