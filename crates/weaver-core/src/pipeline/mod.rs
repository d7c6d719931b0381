//! Orchestration
//!
//! A [`Pipeline`] wires the scanner, extractor, oracle, annotator and graph
//! store together. It is cheap to clone; clones share the oracle, the graph and
//! the per-path locks.
//!
//! Entry points:
//! - [`Pipeline::process_file`]: link mode for one document
//! - [`Pipeline::process_folder`]: link mode over a tree, bounded concurrency
//! - [`Pipeline::process_keywords`]: keyword mode over a tree
//! - [`Pipeline::rebuild_graph`]: graph from markers already in the documents
//! - [`WatchScheduler`]: debounced link mode driven by file events

mod batch;
mod file;
mod keywords;
mod locks;
mod rebuild;
mod report;
mod watch;

pub use keywords::ConceptStats;
pub use locks::PathLocks;
pub use report::{BatchReport, FileReport, ReportedError};
pub use watch::{FileEvent, WatchScheduler};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::error;

use crate::annotate::Annotator;
use crate::config::{Config, MarkerPlacement};
use crate::domain::document::{Extractor, Scanner};
use crate::error::{Error, Result};
use crate::oracle::RelationshipOracle;
use crate::storage::GraphStore;

#[derive(Clone)]
pub struct Pipeline {
    scanner: Scanner,
    extractor: Extractor,
    annotator: Annotator,
    placement: MarkerPlacement,
    min_occurrences: usize,
    max_concurrency: usize,
    oracle: Arc<dyn RelationshipOracle>,
    graph: GraphStore,
    locks: PathLocks,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("scanner", &self.scanner)
            .field("placement", &self.placement)
            .field("min_occurrences", &self.min_occurrences)
            .field("max_concurrency", &self.max_concurrency)
            .field("graph", &self.graph.path())
            .finish()
    }
}

impl Pipeline {
    pub fn new(config: &Config, oracle: Arc<dyn RelationshipOracle>, graph: GraphStore) -> Self {
        Self {
            scanner: Scanner::from_config(config),
            extractor: Extractor::from_config(config),
            annotator: Annotator::from_config(config),
            placement: config.annotate.marker_placement,
            min_occurrences: config.keywords.min_occurrences,
            max_concurrency: config.pipeline.max_concurrency.max(1),
            oracle,
            graph,
            locks: PathLocks::new(),
        }
    }

    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    pub fn oracle(&self) -> &Arc<dyn RelationshipOracle> {
        &self.oracle
    }

    /// Documents under `root`, sorted
    pub async fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let scanner = self.scanner.clone();
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| Error::Other(format!("Scan task failed: {}", e)))?
    }

    /// Write the graph if it changed, recording the outcome on `report`
    async fn checkpoint(&self, report: &mut BatchReport) {
        match self.graph.checkpoint().await {
            Ok(saved) => report.graph_saved = saved,
            Err(e) => {
                error!(error = %e, "Failed to save knowledge graph");
                report.graph_error = Some(ReportedError::from(&e));
            }
        }
    }
}
