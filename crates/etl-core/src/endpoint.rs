//! Destination endpoint identity derivation for the communication graph.
//!
//! Connections into RFC 1918 space are assumed to reach managed hosts and
//! get a `host-...` id; everything else becomes a `NetworkEndpoint` keyed
//! `ip:<ip>:<port>`.

/// Prefixes considered internal: `10/8`, `172.16/12`, `192.168/16`.
const INTERNAL_PREFIXES: [&str; 18] = [
    "192.168.", "10.", "172.16.", "172.17.", "172.18.", "172.19.", "172.20.", "172.21.",
    "172.22.", "172.23.", "172.24.", "172.25.", "172.26.", "172.27.", "172.28.", "172.29.",
    "172.30.", "172.31.",
];

/// Whether `ip` falls in one of the internal ranges.
pub fn is_internal_ip(ip: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|p| ip.starts_with(p))
}

/// Derive the destination node id for a connect event.
///
/// Internal IPs map to `host-<ip-with-dots-replaced-by-dashes>`; external
/// IPs map to the endpoint id `ip:<dst_ip>:<dst_port>`.
pub fn derive_dst_host_id(dst_ip: &str, dst_port: u16) -> String {
    if is_internal_ip(dst_ip) {
        format!("host-{}", dst_ip.replace('.', "-"))
    } else {
        format!("ip:{dst_ip}:{dst_port}")
    }
}

/// Split an `ip:<ip>:<port>` endpoint id back into its parts.
pub fn split_endpoint_id(endpoint_id: &str) -> Option<(&str, u16)> {
    let rest = endpoint_id.strip_prefix("ip:")?;
    let (ip, port) = rest.rsplit_once(':')?;
    Some((ip, port.parse().unwrap_or(0)))
}
