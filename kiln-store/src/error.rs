//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Only structural problems surface as errors. Recoverable data-integrity
/// gaps (an unresolvable reference, a missing history item) degrade with a
/// warning instead, so the store stays usable across partially corrupt
/// persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A serialized form lacking an `id` was passed to `put`/`put_serialized`.
    #[error("serialized form is missing an id")]
    MissingIdentity,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error from a file-backed persistence sink.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
