//! Storage layer - knowledge graph persistence
//!
//! # Architecture
//!
//! - `graph_file`: JSON load/save with atomic writes and load-time repair
//! - `graph_store`: shared `GraphStore` handle with explicit checkpoints
//!
//! # Usage
//!
//! ```ignore
//! use weaver_core::storage::GraphStore;
//!
//! let store = GraphStore::open(vault.join(".weaver/knowledge_graph.json")).await?;
//! store.merge(&record).await;
//! store.checkpoint().await?;
//! ```

pub mod graph_file;
mod graph_store;

pub use graph_store::GraphStore;
