//! Error taxonomy for event decoding and validation.

use thiserror::Error;

/// Errors raised while validating or normalizing a raw event.
#[derive(Debug, Error)]
pub enum EventError {
    /// A required top-level field is absent or empty.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The timestamp is neither integer milliseconds nor RFC 3339.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
