//! JSON file persistence for the knowledge graph
//!
//! The file holds `{ "nodes": [...], "edges": [...] }` in insertion order,
//! pretty-printed UTF-8 without ASCII escaping. Saves go through a temp file in
//! the same directory followed by a rename, so a crash never leaves a
//! half-written graph behind.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::domain::knowledge::{GraphSnapshot, KnowledgeGraph, RepairReport};
use crate::error::{Error, Result};

/// Load a graph from `path`
///
/// A missing file is an empty graph. Dangling edges and duplicates are
/// repaired and reported rather than rejected.
pub fn load(path: &Path) -> Result<(KnowledgeGraph, RepairReport)> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No knowledge graph file yet, starting empty");
            return Ok((KnowledgeGraph::new(), RepairReport::default()));
        }
        Err(e) => return Err(Error::GraphFormat(path.to_path_buf(), e.to_string())),
    };

    if contents.trim().is_empty() {
        return Ok((KnowledgeGraph::new(), RepairReport::default()));
    }

    let snapshot: GraphSnapshot = serde_json::from_str(&contents)
        .map_err(|e| Error::GraphFormat(path.to_path_buf(), e.to_string()))?;

    let (graph, report) = KnowledgeGraph::from_snapshot(snapshot);
    if !report.is_clean() {
        warn!(
            path = %path.display(),
            placeholders = report.placeholder_nodes.len(),
            duplicate_edges = report.duplicate_edges,
            duplicate_nodes = report.duplicate_nodes,
            "Repaired knowledge graph on load"
        );
    }
    info!(
        path = %path.display(),
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "Loaded knowledge graph"
    );

    Ok((graph, report))
}

/// Save a graph to `path`
pub fn save(graph: &KnowledgeGraph, path: &Path) -> Result<()> {
    save_snapshot(&graph.snapshot(), path)
}

/// Atomically write a snapshot to `path`
pub fn save_snapshot(snapshot: &GraphSnapshot, path: &Path) -> Result<()> {
    let write_err = |e: std::io::Error| Error::WriteFailed(path.to_path_buf(), e.to_string());

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_err)?;

    let mut json = serde_json::to_string_pretty(snapshot)?;
    json.push('\n');

    let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp.write_all(json.as_bytes()).map_err(write_err)?;
    temp.as_file().sync_all().map_err(write_err)?;
    temp.persist(path).map_err(|e| write_err(e.error))?;

    debug!(
        path = %path.display(),
        nodes = snapshot.nodes.len(),
        edges = snapshot.edges.len(),
        "Saved knowledge graph"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::{RelationshipRecord, RelationshipType};
    use tempfile::TempDir;

    fn sample_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new();
        graph.merge(
            &RelationshipRecord::new("关系", "感受", RelationshipType::Supports)
                .with_context("关系不会在乎事实如何，只在乎感受。")
                .with_source_file("/vault/关系.md"),
        );
        graph.merge(&RelationshipRecord::new("关系", "焦虑", RelationshipType::Mentions));
        graph
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let (graph, report) = load(&dir.path().join("absent.json")).unwrap();
        assert!(graph.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".weaver").join("knowledge_graph.json");

        let graph = sample_graph();
        save(&graph, &path).unwrap();
        let (loaded, report) = load(&path).unwrap();

        assert!(report.is_clean());
        assert_eq!(loaded.node_count(), 3);
        assert_eq!(loaded.edge_count(), 2);
        assert_eq!(loaded.snapshot(), graph.snapshot());
    }

    #[test]
    fn test_load_save_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        save(&sample_graph(), &path).unwrap();
        let first = fs::read(&path).unwrap();

        let (loaded, _) = load(&path).unwrap();
        save(&loaded, &path).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_saved_file_is_unescaped_utf8() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        save(&sample_graph(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"relationship\": \"支撑观点\""));
        assert!(!text.contains("\\u"));
    }

    #[test]
    fn test_load_repairs_dangling_edges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"{
  "nodes": [],
  "edges": [
    {
      "source": "a",
      "target": "b",
      "relationship": "简单提及",
      "context": "",
      "created_at": "2024-01-01T00:00:00Z"
    }
  ]
}"#,
        )
        .unwrap();

        let (graph, report) = load(&path).unwrap();
        assert_eq!(report.placeholder_nodes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "{ not json").unwrap();

        let err = load(&path).unwrap_err();
        assert_eq!(err.code(), "E400");
    }

    #[test]
    fn test_load_rejects_unknown_relationship() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(
            &path,
            r#"{"nodes": [], "edges": [{"source": "a", "target": "b", "relationship": "friend_of", "created_at": "2024-01-01T00:00:00Z"}]}"#,
        )
        .unwrap();

        assert!(matches!(load(&path), Err(Error::GraphFormat(..))));
    }
}
