//! AegisFlux ETL store writers.
//!
//! Two heterogeneous stores behind async trait seams:
//! - TimescaleDB for time-partitioned raw and enriched events
//! - Neo4j for the host/endpoint communication graph
//!
//! Both writers own their schema bootstrap (idempotent, run on connect)
//! and retry transient failures with a bounded backoff.

pub mod error;
pub mod fakes;
pub mod neo4j;
pub mod schema;
pub mod store_traits;
pub mod timescale;

pub use error::{StoreError, StoreResult};
pub use neo4j::Neo4jWriter;
pub use store_traits::{EventStore, GraphStore};
pub use timescale::TimescaleWriter;
