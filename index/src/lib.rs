//! # Index
//!
//! This crate provides the two parallel indexes at the heart of pixseek:
//! a slot-based metadata table and a fixed-capacity ANN vector index that
//! share one dense id space.
//!
//! ## Features
//!
//! - **Slot Table**: authoritative record of what is indexed, with
//!   tombstone-based slot reuse
//! - **Vector Index**: an ANN graph wrapped at fixed capacity, dimension,
//!   and metric
//! - **Scoring**: metric-tagged distance-to-score transforms resolved at
//!   construction
//! - **Persistence**: JSON snapshots for both indexes, tag-checked on load
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Index Pair                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  SlotTable ──────────── slot id ──────────── VectorIndex        │
//! │      │                                            │             │
//! │      ▼                                            ▼             │
//! │  Occupant{key, fingerprint}              live vector + score    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The invariant both sides uphold: the set of occupied slot ids in the
//! table equals the set of live vector ids, with exactly one live vector
//! per occupied slot.

pub mod ann;
pub mod encoder;
pub mod error;
pub mod slots;

pub use ann::{Hit, Metric, VectorIndex};
pub use encoder::Encoder;
pub use error::{IndexError, Result};
pub use slots::{Occupant, SlotTable};

use tracing::warn;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;

/// Stable integer id shared by both indexes for one source item.
pub type SlotId = usize;

/// The slot table and vector index as one unit.
///
/// Mutations that must keep the two sides consistent go through this pair:
/// [`IndexPair::commit`] and [`IndexPair::drop_slot`] apply the paired
/// updates in an order that preserves the cross-index invariant even when
/// the vector side fails.
#[derive(Debug)]
pub struct IndexPair {
    /// Slot metadata table.
    pub slots: SlotTable,

    /// ANN vector index.
    pub vectors: VectorIndex,
}

impl IndexPair {
    /// Pair a slot table with a vector index.
    pub fn new(slots: SlotTable, vectors: VectorIndex) -> Self {
        Self { slots, vectors }
    }

    /// Commit one embedded item: insert the vector, then occupy the slot.
    ///
    /// The vector insert runs first so that a capacity or dimension failure
    /// leaves the metadata untouched.
    pub fn commit(
        &mut self,
        slot: SlotId,
        key: &str,
        fingerprint: u64,
        vector: Embedding,
    ) -> Result<()> {
        self.vectors.insert(slot, vector)?;
        self.slots.occupy(slot, key, fingerprint);
        Ok(())
    }

    /// Tombstone a slot and logically delete its vector.
    ///
    /// A no-op for slots that are already tombstoned or out of range.
    pub fn drop_slot(&mut self, slot: SlotId) {
        self.slots.tombstone(slot);
        self.vectors.delete(slot);
    }

    /// Number of occupied slots.
    pub fn valid_count(&self) -> usize {
        self.slots.valid_count()
    }

    /// Re-establish the cross-index invariant after loading snapshots that
    /// may have diverged (for example when one file was lost).
    ///
    /// Occupied slots without a live vector are tombstoned; live vectors
    /// without an occupied slot are deleted. Returns the number of entries
    /// dropped from either side.
    pub fn reconcile(&mut self) -> usize {
        let orphaned_slots: Vec<SlotId> = self
            .slots
            .occupied()
            .map(|(slot, _, _)| slot)
            .filter(|slot| !self.vectors.contains(*slot))
            .collect();
        let orphaned_vectors: Vec<SlotId> = self
            .vectors
            .live_ids()
            .filter(|slot| self.slots.key_of(*slot).is_none())
            .collect();

        for slot in &orphaned_slots {
            self.slots.tombstone(*slot);
        }
        for slot in &orphaned_vectors {
            self.vectors.delete(*slot);
        }

        let dropped = orphaned_slots.len() + orphaned_vectors.len();
        if dropped > 0 {
            warn!(
                "Reconciled diverged indexes: dropped {} metadata slots, {} vectors",
                orphaned_slots.len(),
                orphaned_vectors.len()
            );
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(capacity: usize) -> IndexPair {
        IndexPair::new(SlotTable::new(), VectorIndex::new(capacity, 2, Metric::Euclidean))
    }

    #[test]
    fn test_commit_keeps_sides_in_step() {
        let mut pair = pair(8);
        pair.commit(0, "a.jpg", 10, vec![1.0, 0.0]).unwrap();
        pair.commit(1, "b.jpg", 20, vec![0.0, 1.0]).unwrap();

        assert_eq!(pair.valid_count(), 2);
        assert!(pair.vectors.contains(0));
        assert!(pair.vectors.contains(1));
    }

    #[test]
    fn test_failed_commit_leaves_metadata_untouched() {
        let mut pair = pair(1);
        pair.commit(0, "a.jpg", 10, vec![1.0, 0.0]).unwrap();

        let err = pair.commit(1, "b.jpg", 20, vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, IndexError::CapacityExceeded { .. }));
        assert_eq!(pair.valid_count(), 1);
        assert!(pair.slots.key_of(1).is_none());
    }

    #[test]
    fn test_drop_slot_tombstones_both_sides() {
        let mut pair = pair(8);
        pair.commit(0, "a.jpg", 10, vec![1.0, 0.0]).unwrap();
        pair.drop_slot(0);

        assert_eq!(pair.valid_count(), 0);
        assert!(!pair.vectors.contains(0));

        // Dropping again is a no-op.
        pair.drop_slot(0);
        assert_eq!(pair.valid_count(), 0);
    }

    #[test]
    fn test_reconcile_drops_orphans_on_both_sides() {
        let mut pair = pair(8);
        pair.commit(0, "a.jpg", 10, vec![1.0, 0.0]).unwrap();
        pair.commit(1, "b.jpg", 20, vec![0.0, 1.0]).unwrap();

        // Skew the pair: a vector without metadata and metadata without a vector.
        pair.vectors.delete(0);
        pair.vectors.insert(3, vec![0.5, 0.5]).unwrap();

        let dropped = pair.reconcile();
        assert_eq!(dropped, 2);
        assert_eq!(pair.valid_count(), 1);

        let mut occupied: Vec<_> = pair.slots.occupied().map(|(slot, _, _)| slot).collect();
        let mut live: Vec<_> = pair.vectors.live_ids().collect();
        occupied.sort_unstable();
        live.sort_unstable();
        assert_eq!(occupied, live);
    }
}
