//! In-memory knowledge graph
//!
//! Nodes are concepts keyed by name, edges are keyed by
//! `(source, target, relationship)`. Both maps keep insertion order so that a
//! load followed by a save reproduces the file byte for byte.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

use super::relationship::{RelationshipRecord, RelationshipType};

/// A concept in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub title: String,
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub content_snippet: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, at: DateTime<Utc>) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            file_path: None,
            content_snippet: String::new(),
            created_at: at,
            updated_at: at,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.content_snippet = snippet.into();
        self
    }
}

/// A typed relationship between two concepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub relationship: RelationshipType,
    #[serde(default)]
    pub context: String,
    pub created_at: DateTime<Utc>,
}

impl GraphEdge {
    fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.relationship)
    }
}

type EdgeKey = (String, String, RelationshipType);

/// What a merge changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// A node was created or its timestamp/snippet updated
    pub node_changed: bool,
    /// A new edge was inserted
    pub edge_changed: bool,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        self.node_changed || self.edge_changed
    }
}

/// Counts over the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// Edge count per relationship label, in vocabulary order
    pub by_relationship: IndexMap<String, usize>,
}

/// Immutable copy of the graph, also the persisted file format
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// Repairs applied while rebuilding a graph from a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub placeholder_nodes: Vec<String>,
    pub duplicate_edges: usize,
    pub duplicate_nodes: usize,
}

impl RepairReport {
    pub fn is_clean(&self) -> bool {
        self.placeholder_nodes.is_empty() && self.duplicate_edges == 0 && self.duplicate_nodes == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    nodes: IndexMap<String, GraphNode>,
    edges: IndexMap<EdgeKey, GraphEdge>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a relationship record into the graph
    ///
    /// Both endpoints are upserted; the edge is inserted unless an edge with the
    /// same key exists, in which case the first write wins.
    pub fn merge(&mut self, record: &RelationshipRecord) -> MergeOutcome {
        let at = record.created_at;

        let mut source = GraphNode::new(&record.source_concept, at).with_snippet(&record.context);
        if !record.source_file.as_os_str().is_empty() {
            source = source.with_file_path(&record.source_file);
        }
        let target = GraphNode::new(&record.target_concept, at).with_snippet(&record.context);

        let source_changed = self.upsert_node(source);
        let target_changed = self.upsert_node(target);

        let edge = GraphEdge {
            source: record.source_concept.clone(),
            target: record.target_concept.clone(),
            relationship: record.relationship,
            context: record.context.clone(),
            created_at: at,
        };
        let key = edge.key();
        let edge_changed = if self.edges.contains_key(&key) {
            false
        } else {
            self.edges.insert(key, edge);
            true
        };

        MergeOutcome {
            node_changed: source_changed || target_changed,
            edge_changed,
        }
    }

    /// Insert a node, or refresh an existing one
    ///
    /// An existing node keeps its creation time, moves `updated_at` forward to
    /// the later of the two times, and only takes the snippet and file path
    /// when it had none. Returns whether anything changed.
    pub fn upsert_node(&mut self, node: GraphNode) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                let mut changed = false;
                if node.updated_at > existing.updated_at {
                    existing.updated_at = node.updated_at;
                    changed = true;
                }
                if existing.content_snippet.is_empty() && !node.content_snippet.is_empty() {
                    existing.content_snippet = node.content_snippet;
                    changed = true;
                }
                if existing.file_path.is_none() && node.file_path.is_some() {
                    existing.file_path = node.file_path;
                    changed = true;
                }
                changed
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Edges touching `node_id` as either endpoint
    pub fn edges_for(&self, node_id: &str) -> Vec<&GraphEdge> {
        self.edges
            .values()
            .filter(|e| e.source == node_id || e.target == node_id)
            .collect()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> {
        self.edges.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        let mut by_relationship: IndexMap<String, usize> = RelationshipType::all()
            .iter()
            .map(|r| (r.label().to_string(), 0))
            .collect();
        for edge in self.edges.values() {
            if let Some(count) = by_relationship.get_mut(edge.relationship.label()) {
                *count += 1;
            }
        }

        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            by_relationship,
        }
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        }
    }

    /// Pretty-printed JSON of the current graph
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }

    /// Rebuild a graph from a snapshot, repairing what it can
    ///
    /// Duplicate nodes and edges are dropped (first occurrence wins) and edges
    /// whose endpoints are missing get placeholder nodes.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> (Self, RepairReport) {
        let mut graph = Self::new();
        let mut report = RepairReport::default();

        for node in snapshot.nodes {
            if graph.nodes.contains_key(&node.id) {
                report.duplicate_nodes += 1;
                continue;
            }
            graph.nodes.insert(node.id.clone(), node);
        }

        for edge in snapshot.edges {
            let key = edge.key();
            if graph.edges.contains_key(&key) {
                report.duplicate_edges += 1;
                continue;
            }
            for endpoint in [&edge.source, &edge.target] {
                if !graph.nodes.contains_key(endpoint.as_str()) {
                    warn!(node = %endpoint, "Edge references a missing node, adding placeholder");
                    graph
                        .nodes
                        .insert(endpoint.clone(), GraphNode::new(endpoint.as_str(), edge.created_at));
                    report.placeholder_nodes.push(endpoint.clone());
                }
            }
            graph.edges.insert(key, edge);
        }

        (graph, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(source: &str, target: &str, rel: RelationshipType, secs: i64) -> RelationshipRecord {
        RelationshipRecord::new(source, target, rel)
            .with_context(format!("{} 提到 {}", source, target))
            .with_source_file(format!("/vault/{}.md", source))
            .at(at(secs))
    }

    #[test]
    fn test_merge_creates_nodes_and_edge() {
        let mut graph = KnowledgeGraph::new();
        let outcome = graph.merge(&record("关系", "感受", RelationshipType::Supports, 0));

        assert!(outcome.node_changed);
        assert!(outcome.edge_changed);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        let source = graph.get_node("关系").unwrap();
        assert_eq!(source.file_path, Some(PathBuf::from("/vault/关系.md")));
        assert_eq!(source.created_at, source.updated_at);
        assert!(graph.get_node("感受").unwrap().file_path.is_none());
    }

    #[test]
    fn test_merge_same_record_twice_is_stable() {
        let mut graph = KnowledgeGraph::new();
        let rec = record("关系", "感受", RelationshipType::Supports, 0);
        graph.merge(&rec);
        let before = graph.snapshot();

        let outcome = graph.merge(&rec);
        assert!(!outcome.changed());
        assert_eq!(graph.snapshot(), before);
    }

    #[test]
    fn test_merge_bumps_updated_at() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("关系", "感受", RelationshipType::Supports, 0));
        let outcome = graph.merge(&record("关系", "事实", RelationshipType::Refutes, 60));

        assert!(outcome.node_changed);
        let node = graph.get_node("关系").unwrap();
        assert_eq!(node.created_at, at(0));
        assert_eq!(node.updated_at, at(60));

        // An older record never moves time backwards
        graph.merge(&record("关系", "感受", RelationshipType::Mentions, 30));
        assert_eq!(graph.get_node("关系").unwrap().updated_at, at(60));
    }

    #[test]
    fn test_edge_first_write_wins() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("a", "b", RelationshipType::Defines, 0));
        let second = record("a", "b", RelationshipType::Defines, 10).with_context("different");
        let outcome = graph.merge(&second);

        assert!(!outcome.edge_changed);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.edges().next().unwrap().created_at, at(0));
        assert_eq!(graph.edges().next().unwrap().context, "a 提到 b");
    }

    #[test]
    fn test_distinct_relationships_are_distinct_edges() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("a", "b", RelationshipType::Defines, 0));
        graph.merge(&record("a", "b", RelationshipType::IsA, 0));
        graph.merge(&record("b", "a", RelationshipType::Defines, 0));
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.edges_for("a").len(), 3);
        assert!(graph.edges_for("c").is_empty());
    }

    #[test]
    fn test_stats() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("a", "b", RelationshipType::Defines, 0));
        graph.merge(&record("a", "c", RelationshipType::Defines, 0));
        graph.merge(&record("c", "d", RelationshipType::Mentions, 0));

        let stats = graph.stats();
        assert_eq!(stats.node_count, 4);
        assert_eq!(stats.edge_count, 3);
        assert_eq!(stats.by_relationship["定义概念"], 2);
        assert_eq!(stats.by_relationship["简单提及"], 1);
        assert_eq!(stats.by_relationship["支撑观点"], 0);
    }

    #[test]
    fn test_from_snapshot_repairs_dangling_edges() {
        let snapshot = GraphSnapshot {
            nodes: vec![GraphNode::new("a", at(0))],
            edges: vec![
                GraphEdge {
                    source: "a".into(),
                    target: "ghost".into(),
                    relationship: RelationshipType::Mentions,
                    context: String::new(),
                    created_at: at(5),
                },
                GraphEdge {
                    source: "a".into(),
                    target: "ghost".into(),
                    relationship: RelationshipType::Mentions,
                    context: "dup".into(),
                    created_at: at(6),
                },
            ],
        };

        let (graph, report) = KnowledgeGraph::from_snapshot(snapshot);
        assert_eq!(report.placeholder_nodes, vec!["ghost".to_string()]);
        assert_eq!(report.duplicate_edges, 1);
        assert!(!report.is_clean());
        assert_eq!(graph.get_node("ghost").unwrap().created_at, at(5));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_order() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("z", "y", RelationshipType::HasPart, 0));
        graph.merge(&record("a", "b", RelationshipType::IsA, 1));

        let (rebuilt, report) = KnowledgeGraph::from_snapshot(graph.snapshot());
        assert!(report.is_clean());
        let ids: Vec<&str> = rebuilt.nodes().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "y", "a", "b"]);
        assert_eq!(rebuilt.to_json().unwrap(), graph.to_json().unwrap());
    }

    #[test]
    fn test_to_json_keeps_unicode() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("关系", "感受", RelationshipType::Supports, 0));
        let json = graph.to_json().unwrap();
        assert!(json.contains("\"支撑观点\""));
        assert!(json.contains("关系"));
        assert!(!json.contains("\\u"));
    }

    #[test]
    fn test_clear() {
        let mut graph = KnowledgeGraph::new();
        graph.merge(&record("a", "b", RelationshipType::Mentions, 0));
        graph.clear();
        assert!(graph.is_empty());
    }
}
