//! Domain types for the enrichment pipeline.
//!
//! Wire payloads arrive as JSON on the bus. Every shape the pipeline
//! consumes or emits has an explicit record type here: unknown keys are
//! retained through flattened maps (forward compatibility), missing
//! required keys fail the decode.

mod cve;
mod enriched;
mod error;
mod event;

pub use cve::{
    CvssData, CvssEntry, CveCandidate, CveDescription, CveDescriptor, CveReference, CweData,
    PackageInfo, PkgCveMapping,
};
pub use enriched::{EnrichedJoinRecord, JoinEnrichment, JoinRecordMetadata, ENRICHMENT_VERSION};
pub use error::EventError;
pub use event::{EnrichedEvent, EventContext, EventMetadata, RawEvent, Timestamp};
