//! Diff planning: the minimal work list that brings the indexes in sync.

use std::collections::HashSet;

use tracing::debug;

use pixseek_index::{SlotId, SlotTable};

use crate::source::SourceTree;

/// One item the pipeline must embed and commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Slot the result will be committed at.
    pub slot: SlotId,

    /// Canonical source key.
    pub key: String,

    /// Fingerprint observed at planning time, committed with the vector.
    pub fingerprint: u64,
}

/// The ordered work list produced by a planning pass.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Changed items first, then new items.
    pub items: Vec<WorkItem>,

    /// How many of the items are re-embeddings of drifted sources.
    pub changed: usize,

    /// How many of the items are newly discovered sources.
    pub added: usize,
}

impl SyncPlan {
    /// Number of items in the plan.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing needs to be embedded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Computes a [`SyncPlan`] from the current slot table and source tree.
///
/// Planning is read-only with respect to both indexes; re-running it with
/// no source changes yields an empty plan.
pub struct Synchronizer<'a> {
    table: &'a SlotTable,
    tree: &'a SourceTree,
}

impl<'a> Synchronizer<'a> {
    /// Create a planner over the given table and tree.
    pub fn new(table: &'a SlotTable, tree: &'a SourceTree) -> Self {
        Self { table, tree }
    }

    /// Compute the work list.
    ///
    /// Changed pass: every occupied slot is re-fingerprinted; drift queues
    /// the item at its existing slot. A source that vanished since it was
    /// indexed is left for the garbage-collection pass, not treated as
    /// changed.
    ///
    /// New pass: an enumerated item is new iff no occupied slot holds its
    /// key. New items backfill ascending tombstoned slots first, then
    /// append past the current length.
    pub async fn plan(&self) -> SyncPlan {
        let mut items = Vec::new();

        for (slot, key, recorded) in self.table.occupied() {
            match self.tree.fingerprint_of(key).await {
                Some(current) if current != recorded => items.push(WorkItem {
                    slot,
                    key: key.to_string(),
                    fingerprint: current,
                }),
                _ => {}
            }
        }
        let changed = items.len();

        let mut known: HashSet<String> = self
            .table
            .occupied()
            .map(|(_, key, _)| key.to_string())
            .collect();
        let mut free = self.table.tombstoned();
        let mut next = self.table.len();

        for item in self.tree.enumerate() {
            if !known.insert(item.key.clone()) {
                continue;
            }
            let slot = free.next().unwrap_or_else(|| {
                let slot = next;
                next += 1;
                slot
            });
            items.push(WorkItem {
                slot,
                key: item.key,
                fingerprint: item.fingerprint,
            });
        }
        let added = items.len() - changed;

        debug!("Planned {changed} changed + {added} new items");
        SyncPlan {
            items,
            changed,
            added,
        }
    }
}
