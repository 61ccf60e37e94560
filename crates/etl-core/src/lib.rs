//! AegisFlux ETL-Enrich Core Library
//!
//! Domain types and pure logic for the enrichment pipeline: event and
//! feed schemas, the enricher, the exploitability scorer, endpoint
//! derivation, payload decoding, the streaming join cache, retry
//! policies, configuration, and observability plumbing.

pub mod config;
pub mod domain;
pub mod endpoint;
pub mod enrich;
pub mod join;
pub mod metrics;
pub mod payload;
pub mod retry;
pub mod score;
pub mod telemetry;

pub use config::{Config, Neo4jConfig, PgConfig};

pub use domain::{
    CvssData, CvssEntry, CveCandidate, CveDescription, CveDescriptor, CveReference, CweData,
    EnrichedEvent, EnrichedJoinRecord, EventContext, EventError, EventMetadata, JoinEnrichment,
    JoinRecordMetadata, PackageInfo, PkgCveMapping, RawEvent, Timestamp, ENRICHMENT_VERSION,
};

pub use endpoint::{derive_dst_host_id, is_internal_ip, split_endpoint_id};
pub use enrich::{enrich_event, enrich_events, is_ipv4_address, validate_enriched};
pub use join::{JoinCache, JoinCacheConfig};
pub use payload::{connect_args, decode_payload_args, extract_destination};
pub use retry::{retry_with, RetryPolicy};
pub use score::{exploitability_score, round3, RiskLevel, HIGH_RISK_CWES};

pub use metrics::METRICS;
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
