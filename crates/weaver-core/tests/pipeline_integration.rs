//! End-to-end pipeline tests for weaver-core
//!
//! Each test builds a small vault in a temp directory and runs a pipeline over
//! it with a scripted or offline oracle.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use weaver_core::config::Config;
use weaver_core::domain::knowledge::RelationshipType;
use weaver_core::llm::ScriptedTransport;
use weaver_core::oracle::{OfflineOracle, OracleClient, RelationshipOracle, RetryPolicy};
use weaver_core::pipeline::Pipeline;
use weaver_core::storage::{GraphStore, graph_file};

fn graph_path(root: &Path) -> std::path::PathBuf {
    Config::default().graph.resolve_path(root)
}

async fn pipeline(root: &Path, oracle: Arc<dyn RelationshipOracle>) -> Pipeline {
    let graph = GraphStore::open(graph_path(root)).await.unwrap();
    Pipeline::new(&Config::default(), oracle, graph)
}

fn scripted(reply: &str) -> Arc<dyn RelationshipOracle> {
    Arc::new(OracleClient::new(ScriptedTransport::always(reply)).with_policy(RetryPolicy::no_retry()))
}

#[tokio::test]
async fn test_supports_scenario() {
    let vault = TempDir::new().unwrap();
    let doc = vault.path().join("关系.md");
    fs::write(&doc, "# 关系\n\n关系不会在乎事实如何，只在乎[[感受]]。\n").unwrap();

    let pipeline = pipeline(vault.path(), scripted("[[支撑观点]]")).await;
    let report = pipeline
        .process_folder(vault.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.markers_added(), 1);
    assert_eq!(
        fs::read_to_string(&doc).unwrap(),
        "# 关系\n\n关系不会在乎事实如何，只在乎[[感受]]。 [[支撑观点]]\n"
    );

    let (graph, _) = graph_file::load(&graph_path(vault.path())).unwrap();
    let edges: Vec<_> = graph.edges().collect();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].source, "关系");
    assert_eq!(edges[0].target, "感受");
    assert_eq!(edges[0].relationship, RelationshipType::Supports);
    assert!(graph.get_node("感受").is_some());
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let vault = TempDir::new().unwrap();
    fs::write(vault.path().join("a.md"), "例如 [[b]]\n\n但是 [[c]] 不同\n").unwrap();
    fs::write(vault.path().join("b.md"), "[[a]] 是指某物\n").unwrap();

    let pipeline = pipeline(vault.path(), Arc::new(OfflineOracle::new())).await;
    let cancel = CancellationToken::new();

    pipeline.process_folder(vault.path(), &cancel).await.unwrap();
    let first_a = fs::read_to_string(vault.path().join("a.md")).unwrap();
    let first_b = fs::read_to_string(vault.path().join("b.md")).unwrap();
    let first_edges = pipeline.graph().stats().await.edge_count;
    assert_eq!(first_a, "例如 [[b]] [[举例说明]]\n\n但是 [[c]] 不同 [[反驳观点]]\n");
    assert_eq!(first_b, "[[a]] 是指某物 [[定义概念]]\n");

    let report = pipeline.process_folder(vault.path(), &cancel).await.unwrap();
    assert_eq!(report.files_written(), 0);
    assert_eq!(report.markers_added(), 0);
    assert_eq!(fs::read_to_string(vault.path().join("a.md")).unwrap(), first_a);
    assert_eq!(fs::read_to_string(vault.path().join("b.md")).unwrap(), first_b);
    assert_eq!(report.edges_added(), 0);
    assert_eq!(pipeline.graph().stats().await.edge_count, first_edges);
}

#[tokio::test]
async fn test_backup_holds_pre_mutation_bytes() {
    let vault = TempDir::new().unwrap();
    let doc = vault.path().join("note.md");
    let original = "first line\r\nsee [[other]]\r\n";
    fs::write(&doc, original).unwrap();

    let pipeline = pipeline(vault.path(), Arc::new(OfflineOracle::new())).await;
    pipeline
        .process_folder(vault.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(fs::read(vault.path().join("note.md.bak")).unwrap(), original.as_bytes());
    assert_eq!(
        fs::read_to_string(&doc).unwrap(),
        "first line\r\nsee [[other]] [[简单提及]]\r\n"
    );

    // The backup is not picked up as a document on the next scan
    let files = pipeline.scan(vault.path()).await.unwrap();
    assert_eq!(files, vec![doc]);
}

#[tokio::test]
async fn test_fallback_is_deterministic() {
    async fn run() -> (usize, String) {
        let vault = TempDir::new().unwrap();
        fs::write(vault.path().join("a.md"), "[[b]] and [[c]]\n").unwrap();
        let pipeline = pipeline(vault.path(), scripted("I would rather not say")).await;
        let report = pipeline
            .process_folder(vault.path(), &CancellationToken::new())
            .await
            .unwrap();
        (report.fallbacks(), fs::read_to_string(vault.path().join("a.md")).unwrap())
    }

    let (fallbacks, first) = run().await;
    let (_, second) = run().await;

    assert_eq!(fallbacks, 2);
    // Both links fall back to the same label, so one marker goes on the line
    assert_eq!(first, "[[b]] and [[c]] [[简单提及]]\n");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_two_file_keyword_scenario() {
    let vault = TempDir::new().unwrap();
    fs::write(vault.path().join("日记.md"), "最近，焦虑\n").unwrap();
    fs::write(vault.path().join("睡眠.md"), "焦虑，失眠\n").unwrap();

    let pipeline = pipeline(vault.path(), scripted("是")).await;
    let (report, stats) = pipeline
        .process_keywords(vault.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(stats.groups, 1);
    assert_eq!(stats.confirmed, 1);
    assert_eq!(report.files_written(), 2);
    assert_eq!(fs::read_to_string(vault.path().join("日记.md")).unwrap(), "最近，[[焦虑]]\n");
    assert_eq!(fs::read_to_string(vault.path().join("睡眠.md")).unwrap(), "[[焦虑]]，失眠\n");

    let (graph, _) = graph_file::load(&graph_path(vault.path())).unwrap();
    let mut sources: Vec<&str> = graph.edges().map(|e| e.source.as_str()).collect();
    sources.sort();
    assert_eq!(sources, vec!["日记", "睡眠"]);
    assert!(graph.edges().all(|e| e.relationship == RelationshipType::Mentions));

    // One concept node, stamped by the later of the two occurrences
    assert_eq!(graph.nodes().filter(|n| n.id == "焦虑").count(), 1);
    let node = graph.get_node("焦虑").unwrap();
    let stamps: Vec<_> = graph
        .edges()
        .filter(|e| e.target == "焦虑")
        .map(|e| e.created_at)
        .collect();
    assert_eq!(stamps.len(), 2);
    assert_eq!(node.updated_at, stamps.iter().copied().max().unwrap());
}

#[tokio::test]
async fn test_graph_edges_are_deduplicated() {
    let vault = TempDir::new().unwrap();
    fs::write(vault.path().join("a.md"), "[[b]]\n[[b]]\n").unwrap();

    let pipeline = pipeline(vault.path(), Arc::new(OfflineOracle::new())).await;
    pipeline
        .process_folder(vault.path(), &CancellationToken::new())
        .await
        .unwrap();

    let snapshot = pipeline.graph().snapshot().await;
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(
        fs::read_to_string(vault.path().join("a.md")).unwrap(),
        "[[b]] [[简单提及]]\n[[b]] [[简单提及]]\n"
    );
}

#[tokio::test]
async fn test_rebuild_matches_processed_graph() {
    let vault = TempDir::new().unwrap();
    fs::write(vault.path().join("a.md"), "例如 [[b]]\n").unwrap();
    fs::write(vault.path().join("c.md"), "鲸鱼属于 [[哺乳动物]]\n").unwrap();

    let pipeline = pipeline(vault.path(), Arc::new(OfflineOracle::new())).await;
    let cancel = CancellationToken::new();
    pipeline.process_folder(vault.path(), &cancel).await.unwrap();
    let mut processed: Vec<_> = pipeline
        .graph()
        .snapshot()
        .await
        .edges
        .into_iter()
        .map(|e| (e.source, e.target, e.relationship))
        .collect();

    processed.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));

    pipeline.rebuild_graph(vault.path(), &cancel).await.unwrap();
    let mut rebuilt: Vec<_> = pipeline
        .graph()
        .snapshot()
        .await
        .edges
        .into_iter()
        .map(|e| (e.source, e.target, e.relationship))
        .collect();
    rebuilt.sort_by(|x, y| (&x.0, &x.1).cmp(&(&y.0, &y.1)));

    assert_eq!(processed.len(), 2);
    assert_eq!(processed, rebuilt);
}
