//! Fixed-capacity ANN vector index.
//!
//! Wraps an `hnsw_rs` graph behind slot-id semantics: logical deletes,
//! overwrite-with-resurrect, bounded similarity scores, and tag-checked
//! snapshots. The graph algorithm itself is opaque to this crate.

use std::collections::HashMap;
use std::path::Path;

use hnsw_rs::dist::{DistCosine, DistL2};
use hnsw_rs::filter::FilterT;
use hnsw_rs::hnsw::{Hnsw, Neighbour};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::{Embedding, SlotId};

/// Graph construction parameters, matching the tuning the index has always
/// shipped with.
const MAX_NB_CONNECTION: usize = 32;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;

/// Floor for the search beam width; widened for larger `k`.
const EF_SEARCH_MIN: usize = 64;

/// Distance metric, fixed at construction.
///
/// The metric owns its distance-to-score transform, so scoring is resolved
/// once when the index is built rather than dispatched on a name per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// L2 distance; scores squashed through `tanh`.
    Euclidean,

    /// Cosine distance; scores are scaled cosine similarity.
    Cosine,
}

impl Metric {
    /// Map a raw backend distance to a bounded similarity score.
    pub fn score(&self, distance: f32) -> f32 {
        match self {
            Metric::Euclidean => (1.0 - (distance / 3000.0).tanh()) * 100.0,
            Metric::Cosine => 100.0 * (1.0 - distance),
        }
    }
}

/// One ranked query result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    /// Slot id of the matched vector.
    pub slot: SlotId,

    /// Bounded similarity score (higher is closer).
    pub score: f32,
}

/// The underlying graph, instantiated for the configured metric.
enum Graph {
    Euclidean(Hnsw<'static, f32, DistL2>),
    Cosine(Hnsw<'static, f32, DistCosine>),
}

impl Graph {
    fn new(metric: Metric, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        match metric {
            Metric::Euclidean => Graph::Euclidean(Hnsw::new(
                MAX_NB_CONNECTION,
                capacity,
                MAX_LAYER,
                EF_CONSTRUCTION,
                DistL2 {},
            )),
            Metric::Cosine => Graph::Cosine(Hnsw::new(
                MAX_NB_CONNECTION,
                capacity,
                MAX_LAYER,
                EF_CONSTRUCTION,
                DistCosine {},
            )),
        }
    }

    fn insert(&self, vector: &Embedding, point: usize) {
        match self {
            Graph::Euclidean(graph) => graph.insert((vector, point)),
            Graph::Cosine(graph) => graph.insert((vector, point)),
        }
    }

    fn search(&self, vector: &[f32], k: usize, ef: usize, filter: &LiveFilter<'_>) -> Vec<Neighbour> {
        match self {
            Graph::Euclidean(graph) => graph.search_filter(vector, k, ef, Some(filter)),
            Graph::Cosine(graph) => graph.search_filter(vector, k, ef, Some(filter)),
        }
    }
}

/// Restricts graph traversal to points that still back a live slot.
struct LiveFilter<'a> {
    points: &'a HashMap<usize, SlotId>,
}

impl FilterT for LiveFilter<'_> {
    fn hnsw_filter(&self, id: &usize) -> bool {
        self.points.contains_key(id)
    }
}

/// A live slot's current graph point and vector.
#[derive(Debug, Clone)]
struct SlotPoint {
    point: usize,
    vector: Embedding,
}

/// Snapshot layout written by [`VectorIndex::persist`].
#[derive(Serialize, Deserialize)]
struct Snapshot {
    capacity: usize,
    dimension: usize,
    metric: Metric,
    vectors: Vec<(SlotId, Embedding)>,
}

/// ANN vector index at fixed capacity, dimension, and metric.
///
/// The graph cannot remove points, so deletes are logical: a deleted or
/// overwritten slot's old point stays in the graph but is screened out of
/// every query by the live-point filter. Superseded points are shed
/// entirely when a snapshot is reloaded.
pub struct VectorIndex {
    capacity: usize,
    dimension: usize,
    metric: Metric,
    graph: Graph,
    /// Live slot -> current graph point and vector.
    slots: HashMap<SlotId, SlotPoint>,
    /// Live graph point -> slot, the query-time resolution map.
    points: HashMap<usize, SlotId>,
    next_point: usize,
}

impl VectorIndex {
    /// Create an empty index.
    pub fn new(capacity: usize, dimension: usize, metric: Metric) -> Self {
        Self {
            capacity,
            dimension,
            metric,
            graph: Graph::new(metric, capacity),
            slots: HashMap::new(),
            points: HashMap::new(),
            next_point: 0,
        }
    }

    /// Configured capacity in slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Configured metric.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Number of live vectors.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no vector is live.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// True when the slot currently has a live vector.
    pub fn contains(&self, slot: SlotId) -> bool {
        self.slots.contains_key(&slot)
    }

    /// Iterate live slot ids (no particular order).
    pub fn live_ids(&self) -> impl Iterator<Item = SlotId> {
        self.slots.keys().copied()
    }

    /// Insert or overwrite the vector at a slot.
    ///
    /// Overwriting replaces the slot's live vector (the re-embedding path)
    /// and inserting at a logically deleted slot resurrects it. Fails with
    /// [`IndexError::CapacityExceeded`] for slot ids past the configured
    /// capacity and leaves prior state intact.
    pub fn insert(&mut self, slot: SlotId, vector: Embedding) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if slot >= self.capacity {
            return Err(IndexError::CapacityExceeded {
                capacity: self.capacity,
            });
        }

        let point = self.next_point;
        self.next_point += 1;
        self.graph.insert(&vector, point);

        if let Some(previous) = self.slots.insert(slot, SlotPoint { point, vector }) {
            self.points.remove(&previous.point);
        }
        self.points.insert(point, slot);
        Ok(())
    }

    /// Logically delete the vector at a slot.
    ///
    /// No graph compaction happens; deleting twice or deleting a missing id
    /// is a no-op.
    pub fn delete(&mut self, slot: SlotId) {
        if let Some(previous) = self.slots.remove(&slot) {
            self.points.remove(&previous.point);
        }
    }

    /// Query the `k` nearest live vectors, ranked by descending score.
    ///
    /// Ties keep the backend's native ascending-distance order. Returns an
    /// empty list when the index holds nothing.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Hit>> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.slots.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let k = k.min(self.slots.len());
        let ef = EF_SEARCH_MIN.max(2 * k);
        let filter = LiveFilter {
            points: &self.points,
        };
        let neighbours = self.graph.search(vector, k, ef, &filter);

        let mut hits: Vec<Hit> = neighbours
            .into_iter()
            .filter_map(|n| {
                self.points.get(&n.d_id).map(|slot| Hit {
                    slot: *slot,
                    score: self.metric.score(n.distance),
                })
            })
            .collect();
        // The transforms are monotone, so this preserves the backend order
        // while making the descending-score contract explicit.
        hits.sort_by_key(|hit| std::cmp::Reverse(OrderedFloat(hit.score)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Write a snapshot tagged with capacity, dimension, and metric.
    pub async fn persist(&self, path: &Path) -> Result<()> {
        let mut vectors: Vec<(SlotId, Embedding)> = self
            .slots
            .iter()
            .map(|(slot, entry)| (*slot, entry.vector.clone()))
            .collect();
        vectors.sort_by_key(|(slot, _)| *slot);

        let snapshot = Snapshot {
            capacity: self.capacity,
            dimension: self.dimension,
            metric: self.metric,
            vectors,
        };
        let content = serde_json::to_string(&snapshot)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        debug!("Persisted {} vectors to {}", self.slots.len(), path.display());
        Ok(())
    }

    /// Load a snapshot, rebuilding the graph from the live vectors only.
    ///
    /// Fails with [`IndexError::SnapshotMismatch`] when the snapshot tag
    /// differs from the declared configuration in any field.
    pub async fn load(
        path: &Path,
        capacity: usize,
        dimension: usize,
        metric: Metric,
    ) -> Result<Self> {
        let raw = fs::read_to_string(path).await?;
        let snapshot: Snapshot = serde_json::from_str(&raw)?;

        if snapshot.capacity != capacity {
            return Err(IndexError::SnapshotMismatch(format!(
                "capacity {} in snapshot, {capacity} configured",
                snapshot.capacity
            )));
        }
        if snapshot.dimension != dimension {
            return Err(IndexError::SnapshotMismatch(format!(
                "dimension {} in snapshot, {dimension} configured",
                snapshot.dimension
            )));
        }
        if snapshot.metric != metric {
            return Err(IndexError::SnapshotMismatch(format!(
                "metric {:?} in snapshot, {metric:?} configured",
                snapshot.metric
            )));
        }

        let mut index = Self::new(capacity, dimension, metric);
        for (slot, vector) in snapshot.vectors {
            index.insert(slot, vector)?;
        }
        debug!(
            "Loaded {} vectors from {}",
            index.slots.len(),
            path.display()
        );
        Ok(index)
    }
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("capacity", &self.capacity)
            .field("dimension", &self.dimension)
            .field("metric", &self.metric)
            .field("live", &self.slots.len())
            .finish()
    }
}
