//! Error types for the search engine.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in the search engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Index error (capacity, dimension, snapshot).
    #[error("index error: {0}")]
    Index(#[from] pixseek_index::IndexError),

    /// Synchronization error.
    #[error("sync error: {0}")]
    Sync(#[from] pixseek_sync::SyncError),

    /// The probe input could not be read or decoded.
    ///
    /// Distinct from an empty result: an empty index answers a valid probe
    /// with zero hits, while an unreadable probe is this error.
    #[error("probe could not be encoded: {0}")]
    ProbeEncode(PathBuf),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
