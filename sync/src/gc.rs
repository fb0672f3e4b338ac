//! Garbage-collection passes.
//!
//! Vanished sources are not handled by the planner; these passes tombstone
//! their slots and logically delete their vectors. Both run as the commit
//! owner: callers must not have a pipeline in flight.

use std::path::Path;

use tokio::sync::RwLock;
use tracing::info;

use pixseek_index::{IndexPair, SlotId};

use crate::source::canonical_key;

/// Tombstone every occupied slot whose source file no longer exists.
///
/// Returns the number of slots dropped.
pub async fn remove_missing(indexes: &RwLock<IndexPair>) -> usize {
    let targets: Vec<(SlotId, String)> = {
        let guard = indexes.read().await;
        guard
            .slots
            .occupied()
            .map(|(slot, key, _)| (slot, key.to_string()))
            .collect()
    };

    let mut removed = 0;
    for (slot, key) in targets {
        if tokio::fs::metadata(&key).await.is_ok() {
            continue;
        }
        let mut guard = indexes.write().await;
        // The slot may have been reassigned while the lock was released.
        if guard.slots.key_of(slot) == Some(key.as_str()) {
            guard.drop_slot(slot);
            removed += 1;
        }
    }

    if removed > 0 {
        info!("Removed {removed} slots for missing sources");
    }
    removed
}

/// Tombstone every occupied slot whose key lies under the given root.
///
/// Used when a watched root is deconfigured. Returns the number of slots
/// dropped.
pub async fn remove_under(indexes: &RwLock<IndexPair>, root: &Path) -> usize {
    let root_key = canonical_key(root);
    let root_path = Path::new(&root_key);

    let mut guard = indexes.write().await;
    let targets: Vec<SlotId> = guard
        .slots
        .occupied()
        .filter(|(_, key, _)| Path::new(key).starts_with(root_path))
        .map(|(slot, _, _)| slot)
        .collect();

    for slot in &targets {
        guard.drop_slot(*slot);
    }

    if !targets.is_empty() {
        info!("Removed {} slots under {}", targets.len(), root.display());
    }
    targets.len()
}
