//! Knowledge graph domain module
//!
//! - **RelationshipType**: the closed eight-label vocabulary
//! - **RelationshipRecord**: one discovered relationship, consumed by both the
//!   annotator and the graph
//! - **KnowledgeGraph**: concepts as nodes, typed relationships as edges
//!
//! ## Usage
//!
//! ```rust,ignore
//! use weaver_core::domain::knowledge::{KnowledgeGraph, RelationshipRecord, RelationshipType};
//!
//! let record = RelationshipRecord::new("关系", "感受", RelationshipType::Supports)
//!     .with_context("关系不会在乎事实如何，只在乎感受。");
//!
//! let mut graph = KnowledgeGraph::new();
//! let outcome = graph.merge(&record);
//! assert!(outcome.edge_changed);
//! ```

mod graph;
mod relationship;

pub use graph::{
    GraphEdge, GraphNode, GraphSnapshot, GraphStats, KnowledgeGraph, MergeOutcome, RepairReport,
};
pub use relationship::{Origin, RelationshipRecord, RelationshipType};
