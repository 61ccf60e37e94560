//! Error types for the store writers.

use thiserror::Error;

/// Errors that can occur in the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store connection error
    #[error("store connection failed: {0}")]
    Connection(String),

    /// Query or statement error
    #[error("store query failed: {0}")]
    Query(String),

    /// Schema bootstrap error
    #[error("schema setup failed: {0}")]
    SchemaSetup(String),

    /// Record could not be serialized for storage
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A field required by the store layout is invalid
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<neo4rs::Error> for StoreError {
    fn from(err: neo4rs::Error) -> Self {
        StoreError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Whether a sqlx failure is worth retrying: connection-level trouble,
/// not statement or decode errors.
pub fn sqlx_is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}
