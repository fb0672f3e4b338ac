//! # Sync
//!
//! This crate keeps the pixseek index pair consistent with the files under
//! a set of watched roots.
//!
//! ## Features
//!
//! - **Source Scanning**: recursive enumeration with cheap fingerprints
//! - **Diff Planning**: the minimal work list to bring the indexes in sync
//! - **Indexing Pipeline**: a bounded worker pool with a single commit owner
//! - **Gate**: cooperative priority for interactive queries
//! - **Garbage Collection**: passes for vanished files and removed roots
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Synchronization                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  SourceTree ──► Synchronizer ──► SyncPlan                       │
//! │                                     │                           │
//! │                                     ▼                           │
//! │   Gate ◄──── workers ◄──── IndexingPipeline ──► commit owner    │
//! │                 │                                    │          │
//! │                 ▼                                    ▼          │
//! │              Encoder                             IndexPair      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers only read sources and encode; exactly one drain loop applies
//! the results to the indexes. That single-commit-owner discipline, not
//! the gate, is what makes mutation safe.

pub mod error;
pub mod gate;
pub mod gc;
pub mod pipeline;
pub mod plan;
pub mod source;

pub use error::{Result, SyncError};
pub use gate::{Gate, HoldGuard};
pub use gc::{remove_missing, remove_under};
pub use pipeline::{BatchReport, CancelFlag, IndexingPipeline, Progress};
pub use plan::{SyncPlan, Synchronizer, WorkItem};
pub use source::{SourceItem, SourceTree, canonical_key, fingerprint};
