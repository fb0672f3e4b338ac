//! # Retrieval
//!
//! This crate provides the pixseek search engine facade, combining:
//!
//! - **Index Pair**: slot metadata and ANN vectors in one dense id space
//! - **Synchronization**: incremental, concurrent re-indexing of the roots
//! - **Queries**: similarity search resolved back to source keys
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Search Engine                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   search_file ──► Encoder ──► VectorIndex ──► SlotTable ──► hits│
//! │        │                          ▲                             │
//! │        ▼                          │ commit owner                │
//! │      Gate ◄──── workers ◄──── IndexingPipeline ◄──── SyncPlan   │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pixseek_retrieval::{EngineConfig, SearchEngine};
//!
//! let config = EngineConfig::new("~/.pixseek/index")
//!     .with_root("~/Pictures")
//!     .with_dimension(512);
//! let engine = SearchEngine::open(config, encoder).await?;
//!
//! engine.sync().await?;
//! let hits = engine.search_file(Path::new("probe.jpg"), 10).await?;
//! ```

pub mod config;
pub mod engine;
pub mod error;

pub use config::EngineConfig;
pub use engine::{EngineStats, SearchEngine, SearchHit, SyncReport};
pub use error::{EngineError, Result};

// Re-export from dependencies for convenience
pub use pixseek_index::{Embedding, Encoder, Metric, SlotId};
pub use pixseek_sync::{BatchReport, Progress};
