//! Graph rebuild from annotated documents
//!
//! Reads markers already written into the vault. No oracle calls and no
//! document writes.

use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::knowledge::{KnowledgeGraph, Origin, RelationshipRecord};
use crate::error::Result;

use super::file::read_document;
use super::{BatchReport, FileReport, Pipeline};

impl Pipeline {
    /// Replace the graph with the relationships recorded in `root`
    ///
    /// Only links on lines carrying a marker contribute; each takes the first
    /// marker on its line. The new graph is built aside and swapped in once
    /// every document has been read, so a cancelled rebuild leaves both the
    /// live graph and the graph file untouched.
    pub async fn rebuild_graph(&self, root: &Path, cancel: &CancellationToken) -> Result<BatchReport> {
        let files = self.scan(root).await?;
        let mut rebuilt = KnowledgeGraph::new();

        let mut report = BatchReport::default();
        for path in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let text = match read_document(&path).await {
                Ok(text) => text,
                Err(e) => {
                    report.files.push(FileReport::failed(&path, &e));
                    continue;
                }
            };

            let extraction = self.extractor.extract(&path, &text);
            let records: Vec<RelationshipRecord> = extraction
                .links
                .iter()
                .filter_map(|link| {
                    link.existing_relation.map(|relationship| {
                        RelationshipRecord::new(&link.source_concept, &link.raw_target, relationship)
                            .with_context(link.context.clone())
                            .with_source_file(&path)
                            .with_origin(Origin::Existing)
                    })
                })
                .collect();

            let mut file = FileReport::new(&path);
            file.links = extraction.links.len();
            file.already_annotated = records.len();
            file.edges_added = records
                .iter()
                .filter(|record| rebuilt.merge(record).edge_changed)
                .count();
            report.files.push(file);
        }

        if report.cancelled {
            warn!(
                documents = report.files_processed(),
                "Rebuild cancelled, keeping the existing knowledge graph"
            );
            return Ok(report);
        }

        self.graph.replace(rebuilt).await;
        self.checkpoint(&mut report).await;
        info!(
            documents = report.files_processed(),
            edges = report.edges_added(),
            "Rebuilt knowledge graph"
        );
        Ok(report)
    }
}
