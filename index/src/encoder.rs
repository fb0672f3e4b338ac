//! Encoder boundary.
//!
//! The embedding model is an external collaborator; this trait is the
//! whole of the contract the indexes rely on.

use std::path::Path;

use async_trait::async_trait;

use crate::Embedding;

/// Produces fixed-dimension embeddings for source items.
///
/// Implementations must be re-entrant (or internally serialized): the
/// indexing pipeline calls `encode` from several workers at once.
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Dimension of every embedding this encoder produces. Must match the
    /// vector index configuration.
    fn dimension(&self) -> usize;

    /// Encode one source item into an embedding.
    ///
    /// Returns `None` when the source cannot be read or decoded; the caller
    /// skips such items rather than failing the batch.
    async fn encode(&self, source: &Path) -> Option<Embedding>;
}
