//! Shared handle to the knowledge graph
//!
//! One `GraphStore` owns the graph for a run. Clones share the same graph;
//! writers are serialized by the inner `RwLock`. Persistence is an explicit
//! checkpoint rather than a save on every merge.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::knowledge::{
    GraphSnapshot, GraphStats, KnowledgeGraph, MergeOutcome, RelationshipRecord,
};
use crate::error::{Error, Result};

use super::graph_file;

#[derive(Debug, Clone)]
pub struct GraphStore {
    graph: Arc<RwLock<KnowledgeGraph>>,
    path: Option<PathBuf>,
    dirty: Arc<AtomicBool>,
}

impl GraphStore {
    /// Graph that is never persisted
    pub fn in_memory() -> Self {
        Self::from_graph(KnowledgeGraph::new(), None)
    }

    /// Open the graph file at `path`, creating an empty graph if it is missing
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let load_path = path.clone();
        let (graph, report) = tokio::task::spawn_blocking(move || graph_file::load(&load_path))
            .await
            .map_err(|e| Error::Other(format!("Graph load task failed: {}", e)))??;

        let store = Self::from_graph(graph, Some(path));
        // Repairs are written back at the next checkpoint
        store.dirty.store(!report.is_clean(), Ordering::SeqCst);
        Ok(store)
    }

    fn from_graph(graph: KnowledgeGraph, path: Option<PathBuf>) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            path,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn merge(&self, record: &RelationshipRecord) -> MergeOutcome {
        let outcome = self.graph.write().await.merge(record);
        if outcome.changed() {
            self.dirty.store(true, Ordering::SeqCst);
        }
        outcome
    }

    /// Merge several records under one write lock
    pub async fn merge_all(&self, records: &[RelationshipRecord]) -> Vec<MergeOutcome> {
        let mut graph = self.graph.write().await;
        let outcomes: Vec<MergeOutcome> = records.iter().map(|r| graph.merge(r)).collect();
        if outcomes.iter().any(MergeOutcome::changed) {
            self.dirty.store(true, Ordering::SeqCst);
        }
        outcomes
    }

    pub async fn snapshot(&self) -> GraphSnapshot {
        self.graph.read().await.snapshot()
    }

    pub async fn stats(&self) -> GraphStats {
        self.graph.read().await.stats()
    }

    pub async fn to_json(&self) -> Result<String> {
        self.graph.read().await.to_json()
    }

    pub async fn clear(&self) {
        let mut graph = self.graph.write().await;
        if !graph.is_empty() {
            graph.clear();
            self.dirty.store(true, Ordering::SeqCst);
        }
    }

    /// Swap in a graph built elsewhere
    pub async fn replace(&self, graph: KnowledgeGraph) {
        *self.graph.write().await = graph;
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Whether there are merges not yet written by a checkpoint
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Write the graph to its file if anything changed since the last checkpoint
    ///
    /// Returns whether a file was written. In-memory stores never write.
    pub async fn checkpoint(&self) -> Result<bool> {
        let Some(path) = self.path.clone() else {
            return Ok(false);
        };
        if !self.dirty.swap(false, Ordering::SeqCst) {
            debug!(path = %path.display(), "Knowledge graph unchanged, skipping checkpoint");
            return Ok(false);
        }

        let snapshot = self.snapshot().await;
        let (nodes, edges) = (snapshot.nodes.len(), snapshot.edges.len());
        let save_path = path.clone();
        let result = tokio::task::spawn_blocking(move || graph_file::save_snapshot(&snapshot, &save_path))
            .await
            .map_err(|e| Error::Other(format!("Graph save task failed: {}", e)))
            .and_then(|r| r);

        if let Err(e) = result {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }

        info!(path = %path.display(), nodes, edges, "Knowledge graph checkpoint written");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::RelationshipType;
    use tempfile::TempDir;

    fn record(source: &str, target: &str) -> RelationshipRecord {
        RelationshipRecord::new(source, target, RelationshipType::Mentions)
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = GraphStore::in_memory();
        let outcome = store.merge(&record("a", "b")).await;
        assert!(outcome.edge_changed);
        assert!(store.is_dirty());
        assert!(!store.checkpoint().await.unwrap());
        assert_eq!(store.stats().await.edge_count, 1);
    }

    #[tokio::test]
    async fn test_clones_share_graph() {
        let store = GraphStore::in_memory();
        let other = store.clone();
        other.merge(&record("a", "b")).await;
        assert_eq!(store.snapshot().await.edges.len(), 1);
    }

    #[tokio::test]
    async fn test_checkpoint_only_when_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".weaver").join("knowledge_graph.json");

        let store = GraphStore::open(&path).await.unwrap();
        assert!(!store.checkpoint().await.unwrap());
        assert!(!path.exists());

        store.merge_all(&[record("a", "b"), record("b", "c")]).await;
        assert!(store.checkpoint().await.unwrap());
        assert!(path.exists());
        assert!(!store.checkpoint().await.unwrap());

        let reopened = GraphStore::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.node_count, 3);
        assert!(!reopened.is_dirty());
    }

    #[tokio::test]
    async fn test_clear_marks_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        let store = GraphStore::open(&path).await.unwrap();
        store.merge(&record("a", "b")).await;
        store.checkpoint().await.unwrap();

        store.clear().await;
        assert!(store.is_dirty());
        store.checkpoint().await.unwrap();

        let reopened = GraphStore::open(&path).await.unwrap();
        assert_eq!(reopened.stats().await.node_count, 0);
    }

    #[tokio::test]
    async fn test_replace_swaps_graph() {
        let store = GraphStore::in_memory();
        store.merge(&record("old", "edge")).await;

        let mut fresh = KnowledgeGraph::new();
        fresh.merge(&record("a", "b"));
        fresh.merge(&record("b", "c"));
        store.replace(fresh).await;

        assert!(store.is_dirty());
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.edges.len(), 2);
        assert!(snapshot.nodes.iter().all(|n| n.id != "old"));
    }

    #[tokio::test]
    async fn test_open_repaired_graph_is_dirty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"nodes": [], "edges": [{"source": "a", "target": "b", "relationship": "简单提及", "created_at": "2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();

        let store = GraphStore::open(&path).await.unwrap();
        assert!(store.is_dirty());
        assert!(store.checkpoint().await.unwrap());
    }
}
