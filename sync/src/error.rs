//! Error types for synchronization.

use thiserror::Error;

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing the indexes.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Index mutation failed (capacity, dimension, snapshot).
    #[error("index error: {0}")]
    Index(#[from] pixseek_index::IndexError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
