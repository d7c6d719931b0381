//! Domain layer
//!
//! Contains the core models: documents and the knowledge graph.

pub mod document;
pub mod knowledge;
