//! Search engine facade implementation.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{debug, info};

use pixseek_index::{Encoder, IndexPair, SlotTable, VectorIndex};
use pixseek_sync::{
    CancelFlag, Gate, IndexingPipeline, Progress, SourceTree, Synchronizer, remove_missing,
    remove_under,
};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};

/// One resolved query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Canonical key of the matched source item.
    pub key: String,

    /// Bounded similarity score (higher is closer).
    pub score: f32,
}

/// Aggregate outcome of one synchronization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    /// Slots dropped because their source file no longer exists.
    pub removed: usize,

    /// Items the planner queued for embedding.
    pub planned: usize,

    /// Items embedded and committed.
    pub committed: usize,

    /// Items skipped because the encoder returned nothing.
    pub failed: usize,

    /// Whether the batch was cut short by a cancel request.
    pub cancelled: bool,
}

/// Slot-based similarity search engine.
///
/// This is the main entry point for pixseek. It owns the index pair behind
/// one `RwLock`, the query-priority gate, and the encoder, and coordinates:
/// - Similarity queries resolved back to source keys
/// - Incremental synchronization against the watched roots
/// - Snapshot persistence and the rebuild flow
///
/// Construction is asynchronous; the future returned by [`SearchEngine::open`]
/// completes only once both snapshots are loaded, so no caller can observe a
/// partially built engine. Exactly one sync runs at a time: concurrent calls
/// queue on an internal lock rather than interleave.
pub struct SearchEngine {
    /// Configuration.
    config: EngineConfig,

    /// The slot table and vector index as one unit.
    indexes: Arc<RwLock<IndexPair>>,

    /// Embedding model boundary.
    encoder: Arc<dyn Encoder>,

    /// Query-priority gate shared with pipeline workers.
    gate: Gate,

    /// Force-stop flag for the running batch.
    cancel: CancelFlag,

    /// Serializes synchronization passes.
    sync_lock: Mutex<()>,
}

impl SearchEngine {
    /// Open an engine: load both snapshots and wire the sync machinery.
    ///
    /// A missing or corrupt slot table degrades to an empty table; a vector
    /// snapshot written under a different capacity, dimension, or metric
    /// fails the open. After loading, the two sides are reconciled so the
    /// cross-index invariant holds even when one snapshot was lost.
    pub async fn open(config: EngineConfig, encoder: Arc<dyn Encoder>) -> Result<Self> {
        if encoder.dimension() != config.dimension {
            return Err(EngineError::Config(format!(
                "encoder produces {}-dimensional embeddings, index configured for {}",
                encoder.dimension(),
                config.dimension
            )));
        }

        info!("Opening search engine at {}", config.index_dir.display());

        let slots = SlotTable::load(&config.slots_path()).await;
        let vectors_path = config.vectors_path();
        let vectors = if tokio::fs::try_exists(&vectors_path).await.unwrap_or(false) {
            VectorIndex::load(&vectors_path, config.capacity, config.dimension, config.metric)
                .await?
        } else {
            debug!(
                "No vector snapshot at {}; starting empty",
                vectors_path.display()
            );
            VectorIndex::new(config.capacity, config.dimension, config.metric)
        };

        let mut pair = IndexPair::new(slots, vectors);
        pair.reconcile();

        info!("Search engine ready: {} items indexed", pair.valid_count());
        Ok(Self {
            config,
            indexes: Arc::new(RwLock::new(pair)),
            encoder,
            gate: Gate::new(),
            cancel: CancelFlag::new(),
            sync_lock: Mutex::new(()),
        })
    }

    /// Search with a probe file.
    ///
    /// The probe is encoded with the engine's own encoder; a probe that
    /// cannot be read or decoded is [`EngineError::ProbeEncode`], which is
    /// distinct from an empty result.
    pub async fn search_file(&self, probe: &Path, limit: usize) -> Result<Vec<SearchHit>> {
        let _held = self.gate.hold();
        let vector = self
            .encoder
            .encode(probe)
            .await
            .ok_or_else(|| EngineError::ProbeEncode(probe.to_path_buf()))?;
        self.search_vector(&vector, limit).await
    }

    /// Search with a pre-computed probe vector.
    ///
    /// Returns at most `min(limit, valid_count)` hits ordered by descending
    /// score; an empty index answers with an empty list, not an error. The
    /// gate is held for the duration, so pipeline workers pause before their
    /// next item while the query runs.
    pub async fn search_vector(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let _held = self.gate.hold();
        let guard = self.indexes.read().await;
        let limit = guard
            .slots
            .effective_limit(limit.min(self.config.max_results));
        if limit == 0 {
            return Ok(Vec::new());
        }

        // The read lock spans the ANN query and key resolution, so hits
        // resolve against a consistent snapshot. A slot tombstoned after
        // the lock releases is still reported with its last-known key.
        let hits = guard.vectors.query(vector, limit)?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                guard.slots.key_of(hit.slot).map(|key| SearchHit {
                    key: key.to_string(),
                    score: hit.score,
                })
            })
            .collect())
    }

    /// Bring the indexes in sync with the watched roots.
    ///
    /// Runs the garbage-collection pass for vanished sources, plans the
    /// minimal work list, and embeds it on the worker pool. At most one
    /// sync runs at a time; a concurrent call waits for the running one.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_with_progress(None).await
    }

    /// [`SearchEngine::sync`] with incremental progress ticks.
    pub async fn sync_with_progress(
        &self,
        progress: Option<mpsc::UnboundedSender<Progress>>,
    ) -> Result<SyncReport> {
        let _running = self.sync_lock.lock().await;
        self.cancel.clear();

        let removed = remove_missing(&self.indexes).await;

        let tree = SourceTree::new(self.config.existing_roots())
            .with_extensions(self.config.extensions.iter().cloned());
        let plan = {
            let guard = self.indexes.read().await;
            Synchronizer::new(&guard.slots, &tree).plan().await
        };

        let mut pipeline =
            IndexingPipeline::new(self.config.workers, self.gate.clone(), self.cancel.clone());
        if let Some(progress) = progress {
            pipeline = pipeline.with_progress(progress);
        }
        let batch = pipeline
            .run(plan, Arc::clone(&self.encoder), &self.indexes)
            .await?;

        Ok(SyncReport {
            removed,
            planned: batch.total,
            committed: batch.committed,
            failed: batch.failed,
            cancelled: batch.cancelled,
        })
    }

    /// Request that the running sync stop after in-flight items.
    ///
    /// Cooperative: already-committed results stay committed, and the next
    /// sync's plan covers whatever the cancelled batch left out.
    pub fn cancel_sync(&self) {
        self.cancel.cancel();
    }

    /// Write both snapshots to the index directory.
    ///
    /// Durability is caller-scheduled (periodic timer, explicit save,
    /// shutdown); a crash between mutation and persist loses the most
    /// recent batch.
    pub async fn persist(&self) -> Result<()> {
        let guard = self.indexes.read().await;
        guard.slots.persist(&self.config.slots_path()).await?;
        guard.vectors.persist(&self.config.vectors_path()).await?;
        debug!("Persisted {} indexed items", guard.valid_count());
        Ok(())
    }

    /// Drop both indexes and their snapshots, starting empty.
    pub async fn reset(&self) -> Result<()> {
        let mut guard = self.indexes.write().await;
        *guard = IndexPair::new(
            SlotTable::new(),
            VectorIndex::new(self.config.capacity, self.config.dimension, self.config.metric),
        );
        drop(guard);

        for path in [self.config.slots_path(), self.config.vectors_path()] {
            if let Err(err) = tokio::fs::remove_file(&path).await
                && err.kind() != std::io::ErrorKind::NotFound
            {
                return Err(err.into());
            }
        }
        info!("Search engine reset; indexes empty");
        Ok(())
    }

    /// Drop every indexed item under a deconfigured root.
    ///
    /// Returns the number of slots dropped.
    pub async fn remove_root(&self, root: &Path) -> usize {
        remove_under(&self.indexes, root).await
    }

    /// Number of indexed items.
    pub async fn valid_count(&self) -> usize {
        self.indexes.read().await.valid_count()
    }

    /// True when nothing is indexed.
    pub async fn is_empty(&self) -> bool {
        self.valid_count().await == 0
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Engine statistics.
    pub async fn stats(&self) -> EngineStats {
        let guard = self.indexes.read().await;
        EngineStats {
            indexed: guard.valid_count(),
            slots: guard.slots.len(),
            live_vectors: guard.vectors.len(),
            capacity: guard.vectors.capacity(),
            roots: self.config.roots.len(),
        }
    }
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("index_dir", &self.config.index_dir)
            .field("roots", &self.config.roots)
            .finish()
    }
}

/// Statistics about the search engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Number of indexed items (occupied slots).
    pub indexed: usize,

    /// Total slots, tombstones included.
    pub slots: usize,

    /// Live vectors in the ANN index.
    pub live_vectors: usize,

    /// Configured vector index capacity.
    pub capacity: usize,

    /// Configured watched roots.
    pub roots: usize,
}
