//! Error types for the index pair.

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur in the slot table or vector index.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Vector index is full; the insert was rejected and prior state kept.
    #[error("vector index capacity exceeded ({capacity} slots)")]
    CapacityExceeded { capacity: usize },

    /// Vector length does not match the configured dimension.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted snapshot was written under a different configuration.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
