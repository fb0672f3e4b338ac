//! Slot metadata table with tombstone-based slot reuse.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::SlotId;
use crate::error::Result;

/// Sentinel stored in place of a key for tombstoned slots. NUL is not a
/// legal path character on any supported platform, so no real key can
/// collide with it.
const TOMBSTONE_MARKER: &str = "\u{0}";

/// What a slot currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Occupant {
    /// Logically removed; the slot id is free for reuse.
    Tombstone,

    /// A live source item.
    Occupied {
        /// Canonical source key.
        key: String,

        /// Content-state signature captured when the item was embedded.
        fingerprint: u64,
    },
}

/// Authoritative record of what is indexed.
///
/// Slots form a dense id space shared with the vector index. Removed items
/// leave a tombstone behind so their id can be handed to a different source
/// item later, which bounds index growth.
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: Vec<Occupant>,
    valid: usize,
}

impl SlotTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from disk.
    ///
    /// Missing or corrupt storage degrades to an empty table; loading never
    /// fails.
    pub async fn load(path: &Path) -> Self {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(err) => {
                debug!("No slot table at {}: {err}; starting empty", path.display());
                return Self::new();
            }
        };

        let pairs: Vec<(String, u64)> = match serde_json::from_str(&raw) {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!(
                    "Corrupt slot table at {}: {err}; starting empty",
                    path.display()
                );
                return Self::new();
            }
        };

        let slots: Vec<Occupant> = pairs
            .into_iter()
            .map(|(key, fingerprint)| {
                if key == TOMBSTONE_MARKER {
                    Occupant::Tombstone
                } else {
                    Occupant::Occupied { key, fingerprint }
                }
            })
            .collect();
        let valid = slots
            .iter()
            .filter(|o| matches!(o, Occupant::Occupied { .. }))
            .count();

        debug!(
            "Loaded slot table from {}: {} slots, {valid} occupied",
            path.display(),
            slots.len()
        );
        Self { slots, valid }
    }

    /// Persist the table as an ordered list of `[key, fingerprint]` pairs.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let pairs: Vec<(&str, u64)> = self
            .slots
            .iter()
            .map(|o| match o {
                Occupant::Tombstone => (TOMBSTONE_MARKER, 0),
                Occupant::Occupied { key, fingerprint } => (key.as_str(), *fingerprint),
            })
            .collect();
        let content = serde_json::to_string_pretty(&pairs)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Assign a slot to a key: the lowest-numbered tombstoned slot when one
    /// exists, otherwise a fresh id appended at the current length.
    pub fn assign(&mut self, key: &str, fingerprint: u64) -> SlotId {
        let slot = self
            .slots
            .iter()
            .position(|o| matches!(o, Occupant::Tombstone))
            .unwrap_or(self.slots.len());
        self.occupy(slot, key, fingerprint);
        slot
    }

    /// Write an occupant at a specific slot, extending the table with
    /// tombstones as needed.
    ///
    /// Overwriting an occupied slot replaces its key and fingerprint in
    /// place (the re-embedding path).
    pub fn occupy(&mut self, slot: SlotId, key: &str, fingerprint: u64) {
        while self.slots.len() <= slot {
            self.slots.push(Occupant::Tombstone);
        }
        if matches!(self.slots[slot], Occupant::Tombstone) {
            self.valid += 1;
        }
        self.slots[slot] = Occupant::Occupied {
            key: key.to_string(),
            fingerprint,
        };
    }

    /// Mark a slot as logically removed.
    ///
    /// A no-op when the slot is already tombstoned or out of range.
    pub fn tombstone(&mut self, slot: SlotId) {
        if let Some(occupant) = self.slots.get_mut(slot)
            && matches!(occupant, Occupant::Occupied { .. })
        {
            *occupant = Occupant::Tombstone;
            self.valid -= 1;
        }
    }

    /// Number of occupied slots.
    pub fn valid_count(&self) -> usize {
        self.valid
    }

    /// Clamp an over-large neighbor request to what the table can resolve.
    pub fn effective_limit(&self, k: usize) -> usize {
        k.min(self.valid)
    }

    /// Total number of slots, tombstones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.valid == 0
    }

    /// The occupant at a slot, if the slot exists.
    pub fn get(&self, slot: SlotId) -> Option<&Occupant> {
        self.slots.get(slot)
    }

    /// The key at a slot, when the slot is occupied.
    pub fn key_of(&self, slot: SlotId) -> Option<&str> {
        match self.slots.get(slot) {
            Some(Occupant::Occupied { key, .. }) => Some(key),
            _ => None,
        }
    }

    /// Iterate occupied slots as `(slot, key, fingerprint)`.
    pub fn occupied(&self) -> impl Iterator<Item = (SlotId, &str, u64)> {
        self.slots.iter().enumerate().filter_map(|(slot, o)| match o {
            Occupant::Occupied { key, fingerprint } => Some((slot, key.as_str(), *fingerprint)),
            Occupant::Tombstone => None,
        })
    }

    /// Iterate tombstoned slot ids in ascending order.
    pub fn tombstoned(&self) -> impl Iterator<Item = SlotId> {
        self.slots.iter().enumerate().filter_map(|(slot, o)| match o {
            Occupant::Tombstone => Some(slot),
            Occupant::Occupied { .. } => None,
        })
    }
}
