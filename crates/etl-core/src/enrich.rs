//! Event enrichment: environment tag and synthetic reverse DNS.
//!
//! Enrichment is non-destructive. The input event is read, never written;
//! the output is a new record with a `context` block merged in.

use serde_json::Value;

use crate::domain::{EnrichedEvent, EventContext, RawEvent};

/// Strict quad-dotted IPv4 check. IPv6 literals and hostnames fail.
pub fn is_ipv4_address(s: &str) -> bool {
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

/// Last octet of a valid IPv4 address.
pub fn last_octet(s: &str) -> Option<&str> {
    if !is_ipv4_address(s) {
        return None;
    }
    s.rsplit('.').next()
}

/// Annotate `ev` with `context.env` and (optionally) `context.rdns`.
///
/// `rdns` is `host-<last-octet>.local` when `fake_rdns` is enabled and
/// `args.dst_ip` is a valid IPv4 literal, `None` otherwise.
pub fn enrich_event(ev: &RawEvent, env: &str, fake_rdns: bool) -> EnrichedEvent {
    let rdns = if fake_rdns {
        ev.args
            .get("dst_ip")
            .and_then(Value::as_str)
            .and_then(last_octet)
            .map(|octet| format!("host-{octet}.local"))
    } else {
        None
    };

    EnrichedEvent {
        event: ev.clone(),
        context: EventContext {
            env: env.to_string(),
            rdns,
        },
    }
}

/// Enrich a batch of events with the same settings.
pub fn enrich_events(events: &[RawEvent], env: &str, fake_rdns: bool) -> Vec<EnrichedEvent> {
    events.iter().map(|ev| enrich_event(ev, env, fake_rdns)).collect()
}

/// Check that a JSON record (e.g. re-consumed from the enriched subject)
/// carries a `context` block with a non-null `env`.
pub fn validate_enriched(record: &Value) -> bool {
    record
        .get("context")
        .and_then(|ctx| ctx.get("env"))
        .map(|env| !env.is_null())
        .unwrap_or(false)
}
