//! Cognitive Weaver Core Library
//!
//! This crate provides the core functionality for Cognitive Weaver:
//! - Document scanning, link and keyword extraction, candidate clustering
//! - Relationship oracle (OpenAI-compatible LLM or offline rules) with retry
//!   and fallback
//! - In-place annotation with backups and atomic writes
//! - Knowledge graph with JSON persistence
//! - Batch, keyword, rebuild and watch pipelines

pub mod annotate;
pub mod config;
pub mod domain;
pub mod error;
pub mod llm;
pub mod oracle;
pub mod pipeline;
pub mod storage;

pub use error::{Error, Result};

/// Crate version, shown by `weaver version`
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::knowledge::{KnowledgeGraph, RelationshipRecord, RelationshipType};
    pub use crate::error::{Error, Result};
    pub use crate::oracle::RelationshipOracle;
    pub use crate::pipeline::{BatchReport, FileEvent, Pipeline, WatchScheduler};
    pub use crate::storage::GraphStore;
}
