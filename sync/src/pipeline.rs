//! Concurrent indexing pipeline.
//!
//! Workers read and encode; a single drain loop commits. That split is the
//! one serialization point the cross-index invariant relies on.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use pixseek_index::{Embedding, Encoder, IndexPair};

use crate::error::Result;
use crate::gate::Gate;
use crate::plan::{SyncPlan, WorkItem};

/// Incremental progress tick emitted while a batch runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Items handled so far, committed or skipped.
    pub processed: usize,

    /// Total items in the batch.
    pub total: usize,
}

/// Shared force-stop flag for one sync operation.
///
/// Cooperative only: workers poll it between items, so the in-flight item
/// still completes and its commit is kept.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Create a cleared flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the running batch stop after in-flight items.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Reset the flag for a new sync operation.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    /// True once a stop has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Aggregate outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Items in the plan.
    pub total: usize,

    /// Items embedded and committed.
    pub committed: usize,

    /// Items skipped because the encoder returned nothing.
    pub failed: usize,

    /// Whether the batch was cut short by the cancel flag.
    pub cancelled: bool,
}

/// Result of encoding one work item.
struct WorkOutcome {
    item: WorkItem,
    embedding: Option<Embedding>,
}

/// Bounded worker pool that turns a [`SyncPlan`] into committed updates.
pub struct IndexingPipeline {
    workers: usize,
    gate: Gate,
    cancel: CancelFlag,
    progress: Option<mpsc::UnboundedSender<Progress>>,
}

impl IndexingPipeline {
    /// Create a pipeline with the given worker count.
    pub fn new(workers: usize, gate: Gate, cancel: CancelFlag) -> Self {
        Self {
            workers: workers.max(1),
            gate,
            cancel,
            progress: None,
        }
    }

    /// Attach a progress channel; ticks are sent best-effort.
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<Progress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run one batch to completion (or cancellation).
    ///
    /// Workers wait on the gate before every item, poll the cancel flag,
    /// and emit encode results; this method's drain loop is the only place
    /// the indexes are mutated. Encode failures are skipped and counted.
    /// A capacity failure aborts the batch and propagates; results
    /// committed before it stay committed.
    pub async fn run(
        &self,
        plan: SyncPlan,
        encoder: Arc<dyn Encoder>,
        indexes: &RwLock<IndexPair>,
    ) -> Result<BatchReport> {
        let total = plan.items.len();
        let mut report = BatchReport {
            total,
            ..BatchReport::default()
        };
        if total == 0 {
            report.cancelled = self.cancel.is_cancelled();
            return Ok(report);
        }

        info!(
            "Indexing batch of {total} items ({} changed, {} new)",
            plan.changed, plan.added
        );

        let (work_tx, work_rx) = async_channel::unbounded::<WorkItem>();
        for item in plan.items {
            let _ = work_tx.send(item).await;
        }
        drop(work_tx);

        let (result_tx, mut result_rx) = mpsc::channel::<WorkOutcome>(self.workers * 2);
        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            handles.push(tokio::spawn(worker(
                work_rx.clone(),
                result_tx.clone(),
                Arc::clone(&encoder),
                self.gate.clone(),
                self.cancel.clone(),
            )));
        }
        drop(work_rx);
        drop(result_tx);

        let mut processed = 0usize;
        while let Some(outcome) = result_rx.recv().await {
            processed += 1;
            match outcome.embedding {
                Some(vector) => {
                    let mut guard = indexes.write().await;
                    guard.commit(
                        outcome.item.slot,
                        &outcome.item.key,
                        outcome.item.fingerprint,
                        vector,
                    )?;
                    report.committed += 1;
                }
                None => {
                    debug!("Skipping {}: encode failed", outcome.item.key);
                    report.failed += 1;
                }
            }
            self.tick(processed, total);
        }

        for handle in handles {
            let _ = handle.await;
        }

        report.cancelled = self.cancel.is_cancelled();
        info!(
            "Batch finished: {} committed, {} failed of {total}",
            report.committed, report.failed
        );
        Ok(report)
    }

    fn tick(&self, processed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            let _ = progress.send(Progress { processed, total });
        }
    }
}

/// One pool worker: wait for the gate, honor the cancel flag, encode, emit.
async fn worker(
    work: async_channel::Receiver<WorkItem>,
    results: mpsc::Sender<WorkOutcome>,
    encoder: Arc<dyn Encoder>,
    gate: Gate,
    cancel: CancelFlag,
) {
    loop {
        gate.wait_open().await;
        if cancel.is_cancelled() {
            break;
        }
        let Ok(item) = work.recv().await else {
            break;
        };
        let embedding = encoder.encode(Path::new(&item.key)).await;
        if results.send(WorkOutcome { item, embedding }).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    use pixseek_index::{IndexError, Metric, SlotTable, VectorIndex};

    use crate::source::{SourceTree, canonical_key};

    /// Deterministic encoder over file bytes; files starting with
    /// `corrupt` refuse to encode.
    struct StubEncoder {
        calls: AtomicUsize,
    }

    impl StubEncoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Encoder for StubEncoder {
        fn dimension(&self) -> usize {
            4
        }

        async fn encode(&self, source: &Path) -> Option<Embedding> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let bytes = tokio::fs::read(source).await.ok()?;
            if bytes.starts_with(b"corrupt") {
                return None;
            }
            let sum: u64 = bytes.iter().map(|b| u64::from(*b)).sum();
            Some(vec![
                bytes.len() as f32,
                (sum % 251) as f32,
                f32::from(*bytes.first()?),
                f32::from(*bytes.last()?),
            ])
        }
    }

    fn empty_indexes(capacity: usize) -> Arc<RwLock<IndexPair>> {
        Arc::new(RwLock::new(IndexPair::new(
            SlotTable::new(),
            VectorIndex::new(capacity, 4, Metric::Euclidean),
        )))
    }

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    async fn plan_for(dir: &Path, indexes: &RwLock<IndexPair>) -> SyncPlan {
        let tree = SourceTree::new([dir.to_path_buf()]);
        let guard = indexes.read().await;
        crate::plan::Synchronizer::new(&guard.slots, &tree).plan().await
    }

    #[tokio::test]
    async fn test_batch_commits_and_upholds_invariant() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.jpg", b"aaa");
        write(temp_dir.path(), "b.jpg", b"bbbb");
        write(temp_dir.path(), "c.jpg", b"ccccc");

        let indexes = empty_indexes(16);
        let plan = plan_for(temp_dir.path(), &indexes).await;
        let pipeline = IndexingPipeline::new(4, Gate::new(), CancelFlag::new());
        let report = pipeline
            .run(plan, StubEncoder::new(), &indexes)
            .await
            .unwrap();

        assert_eq!(report.committed, 3);
        assert_eq!(report.failed, 0);
        assert!(!report.cancelled);

        let guard = indexes.read().await;
        assert_eq!(guard.valid_count(), 3);
        let mut occupied: Vec<_> = guard.slots.occupied().map(|(slot, _, _)| slot).collect();
        let mut live: Vec<_> = guard.vectors.live_ids().collect();
        occupied.sort_unstable();
        live.sort_unstable();
        assert_eq!(occupied, live);
    }

    #[tokio::test]
    async fn test_encode_failure_skips_item_without_tombstoning() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "good.jpg", b"fine");
        let bad = write(temp_dir.path(), "bad.jpg", b"corrupt bytes");

        let indexes = empty_indexes(16);
        let plan = plan_for(temp_dir.path(), &indexes).await;
        let pipeline = IndexingPipeline::new(2, Gate::new(), CancelFlag::new());
        let report = pipeline
            .run(plan, StubEncoder::new(), &indexes)
            .await
            .unwrap();

        assert_eq!(report.committed, 1);
        assert_eq!(report.failed, 1);

        let guard = indexes.read().await;
        assert_eq!(guard.valid_count(), 1);
        let bad_key = canonical_key(&bad);
        assert!(guard.slots.occupied().all(|(_, key, _)| key != bad_key));
    }

    #[tokio::test]
    async fn test_cancel_before_start_commits_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.jpg", b"aaa");
        write(temp_dir.path(), "b.jpg", b"bbbb");

        let indexes = empty_indexes(16);
        let plan = plan_for(temp_dir.path(), &indexes).await;

        let cancel = CancelFlag::new();
        cancel.cancel();
        let pipeline = IndexingPipeline::new(2, Gate::new(), cancel);
        let report = pipeline
            .run(plan, StubEncoder::new(), &indexes)
            .await
            .unwrap();

        assert_eq!(report.committed, 0);
        assert!(report.cancelled);
        assert_eq!(indexes.read().await.valid_count(), 0);
    }

    #[tokio::test]
    async fn test_held_gate_pauses_workers_until_released() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.jpg", b"aaa");
        write(temp_dir.path(), "b.jpg", b"bbbb");

        let indexes = empty_indexes(16);
        let plan = plan_for(temp_dir.path(), &indexes).await;

        let gate = Gate::new();
        let guard = gate.hold();
        let encoder = StubEncoder::new();

        let run = {
            let indexes = Arc::clone(&indexes);
            let encoder = Arc::clone(&encoder);
            let pipeline = IndexingPipeline::new(2, gate.clone(), CancelFlag::new());
            tokio::spawn(async move { pipeline.run(plan, encoder, &indexes).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(encoder.calls.load(Ordering::SeqCst), 0);

        drop(guard);
        let report = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(report.committed, 2);
    }

    #[tokio::test]
    async fn test_capacity_failure_aborts_and_keeps_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let a = write(temp_dir.path(), "a.jpg", b"aaa");
        let b = write(temp_dir.path(), "b.jpg", b"bbbb");

        let plan = SyncPlan {
            items: vec![
                WorkItem {
                    slot: 0,
                    key: canonical_key(&a),
                    fingerprint: 1,
                },
                WorkItem {
                    slot: 1,
                    key: canonical_key(&b),
                    fingerprint: 2,
                },
            ],
            changed: 0,
            added: 2,
        };

        let indexes = empty_indexes(1);
        let pipeline = IndexingPipeline::new(1, Gate::new(), CancelFlag::new());
        let err = pipeline
            .run(plan, StubEncoder::new(), &indexes)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Index(IndexError::CapacityExceeded { .. })
        ));

        let guard = indexes.read().await;
        assert_eq!(guard.valid_count(), 1);
        assert_eq!(guard.slots.key_of(0), Some(canonical_key(&a).as_str()));
    }

    #[tokio::test]
    async fn test_progress_ticks_cover_the_batch() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.jpg", b"aaa");
        write(temp_dir.path(), "b.jpg", b"bbbb");

        let indexes = empty_indexes(16);
        let plan = plan_for(temp_dir.path(), &indexes).await;

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let pipeline =
            IndexingPipeline::new(2, Gate::new(), CancelFlag::new()).with_progress(progress_tx);
        pipeline
            .run(plan, StubEncoder::new(), &indexes)
            .await
            .unwrap();

        let mut ticks = Vec::new();
        while let Ok(tick) = progress_rx.try_recv() {
            ticks.push(tick);
        }
        assert_eq!(ticks.len(), 2);
        assert_eq!(
            ticks.last(),
            Some(&Progress {
                processed: 2,
                total: 2
            })
        );
    }
}
