//! Configuration for the search engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pixseek_index::Metric;
use pixseek_sync::source::DEFAULT_EXTENSIONS;

/// Configuration for a [`SearchEngine`](crate::SearchEngine).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory holding both index snapshots.
    pub index_dir: PathBuf,

    /// Roots whose files are indexed.
    pub roots: Vec<PathBuf>,

    /// Fixed capacity of the vector index, in slots.
    pub capacity: usize,

    /// Embedding dimension; must match the encoder.
    pub dimension: usize,

    /// Distance metric, fixed for the life of the index.
    pub metric: Metric,

    /// Worker count for the indexing pipeline.
    pub workers: usize,

    /// Upper bound on results per query.
    pub max_results: usize,

    /// File extensions to index (matched case-insensitively).
    pub extensions: Vec<String>,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            roots: Vec::new(),
            capacity: 1_000_000,
            dimension: 512,
            metric: Metric::Euclidean,
            workers: 4,
            max_results: 30,
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }

    /// Add a root to index.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Set the vector index capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the distance metric.
    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Set the pipeline worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set the per-query result cap.
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Replace the indexed extension set.
    pub fn with_extensions(mut self, extensions: impl IntoIterator<Item = String>) -> Self {
        self.extensions = extensions.into_iter().collect();
        self
    }

    /// Path of the slot table snapshot.
    pub fn slots_path(&self) -> PathBuf {
        self.index_dir.join("slots.json")
    }

    /// Path of the vector index snapshot.
    pub fn vectors_path(&self) -> PathBuf {
        self.index_dir.join("vectors.json")
    }

    /// Roots that currently exist on disk.
    pub(crate) fn existing_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .filter(|root| Path::new(root).is_dir())
            .cloned()
            .collect()
    }
}
