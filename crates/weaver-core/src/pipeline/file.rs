//! Link mode for a single document

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::annotate::AnnotationPlan;
use crate::domain::knowledge::{Origin, RelationshipRecord};
use crate::error::{Error, Result};

use super::{FileReport, Pipeline};

/// Read a document as UTF-8 text
pub(crate) async fn read_document(path: &Path) -> Result<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::DocumentNotFound(path.to_path_buf())),
        Err(e) if e.kind() == ErrorKind::InvalidData => Err(Error::InvalidInput(format!(
            "'{}' is not valid UTF-8",
            path.display()
        ))),
        Err(e) => Err(Error::Io(e)),
    }
}

impl Pipeline {
    /// Classify every unannotated link in `path` and write the markers
    ///
    /// Failures are reported, not returned. Records reach the graph only when
    /// the document was written, or needed no edits.
    pub async fn process_file(&self, path: &Path) -> FileReport {
        match self.link_file(path).await {
            Ok(report) => report,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping document");
                FileReport::failed(path, &e)
            }
        }
    }

    async fn link_file(&self, path: &Path) -> Result<FileReport> {
        let text = read_document(path).await?;
        let extraction = self.extractor.extract(path, &text);

        let mut report = FileReport::new(path);
        report.links = extraction.links.len();
        if extraction.links.is_empty() {
            debug!(path = %path.display(), "No links found");
            return Ok(report);
        }

        let mut plan = AnnotationPlan::new(self.placement);
        let mut records = Vec::with_capacity(extraction.links.len());

        for link in &extraction.links {
            let record = match link.existing_relation {
                Some(relationship) => {
                    report.already_annotated += 1;
                    RelationshipRecord::new(&link.source_concept, &link.raw_target, relationship)
                        .with_origin(Origin::Existing)
                }
                None => {
                    let verdict = self
                        .oracle
                        .infer_relation(&link.source_concept, &link.raw_target, &link.context)
                        .await;
                    if verdict.origin.is_fallback() {
                        report.fallbacks += 1;
                    }
                    if plan.add_marker(link, verdict.relationship) {
                        report.markers_added += 1;
                    }
                    RelationshipRecord::new(&link.source_concept, &link.raw_target, verdict.relationship)
                        .with_confidence(verdict.confidence)
                        .with_origin(verdict.origin)
                }
            };
            records.push(record.with_context(link.context.clone()).with_source_file(path));
        }

        if !plan.is_empty() {
            let _guard = self.locks.lock(path).await;
            match self
                .annotator
                .apply(path, plan.into_edits(), Some(text.into_bytes()))
                .await
            {
                Ok(outcome) => report.written = outcome.is_applied(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Annotation abandoned");
                    report.markers_added = 0;
                    return Ok(report.with_error(&e));
                }
            }
        }

        report.edges_added = self
            .graph
            .merge_all(&records)
            .await
            .iter()
            .filter(|outcome| outcome.edge_changed)
            .count();

        info!(
            path = %path.display(),
            links = report.links,
            markers = report.markers_added,
            fallbacks = report.fallbacks,
            "Processed document"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::knowledge::RelationshipType;
    use crate::llm::ScriptedTransport;
    use crate::oracle::{OfflineOracle, OracleClient, RetryPolicy};
    use crate::storage::GraphStore;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn pipeline_with(transport: ScriptedTransport) -> Pipeline {
        let oracle = OracleClient::new(transport).with_policy(RetryPolicy::no_retry());
        Pipeline::new(&Config::default(), Arc::new(oracle), GraphStore::in_memory())
    }

    #[tokio::test]
    async fn test_annotates_link_line() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("关系.md");
        fs::write(&doc, "关系不会在乎事实如何，只在乎[[感受]]。\n第二行\n").unwrap();

        let pipeline = pipeline_with(ScriptedTransport::always("[[支撑观点]]"));
        let report = pipeline.process_file(&doc).await;

        assert!(report.is_ok());
        assert_eq!(report.markers_added, 1);
        assert!(report.written);
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            "关系不会在乎事实如何，只在乎[[感受]]。 [[支撑观点]]\n第二行\n"
        );

        let snapshot = pipeline.graph().snapshot().await;
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.edges[0].source, "关系");
        assert_eq!(snapshot.edges[0].target, "感受");
        assert_eq!(snapshot.edges[0].relationship, RelationshipType::Supports);
    }

    #[tokio::test]
    async fn test_links_in_code_get_no_marker() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        let text = "```\n[[b]]\n```\n写作 `[[c]]` 的语法\n";
        fs::write(&doc, text).unwrap();

        let pipeline = pipeline_with(ScriptedTransport::always("[[支撑观点]]"));
        let report = pipeline.process_file(&doc).await;

        assert!(report.is_ok());
        assert_eq!(report.links, 0);
        assert!(!report.written);
        assert_eq!(fs::read_to_string(&doc).unwrap(), text);
        assert!(pipeline.graph().snapshot().await.edges.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_asks_nothing() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "见 [[b]]\n").unwrap();

        let pipeline = pipeline_with(ScriptedTransport::always("[[引出主题]]"));
        pipeline.process_file(&doc).await;
        let after_first = fs::read_to_string(&doc).unwrap();

        let report = pipeline.process_file(&doc).await;
        assert_eq!(report.already_annotated, 1);
        assert_eq!(report.markers_added, 0);
        assert!(!report.written);
        assert_eq!(fs::read_to_string(&doc).unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_fallback_still_annotates() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "[[b]]").unwrap();

        let pipeline = pipeline_with(ScriptedTransport::always("no idea"));
        let report = pipeline.process_file(&doc).await;

        assert_eq!(report.fallbacks, 1);
        assert_eq!(fs::read_to_string(&doc).unwrap(), "[[b]] [[简单提及]]");
    }

    #[tokio::test]
    async fn test_missing_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::new(
            &Config::default(),
            Arc::new(OfflineOracle::new()),
            GraphStore::in_memory(),
        );
        let report = pipeline.process_file(&dir.path().join("gone.md")).await;
        assert_eq!(report.error.unwrap().code, "E002");
    }

    #[tokio::test]
    async fn test_document_without_links_is_untouched() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "plain text\n").unwrap();

        let transport = ScriptedTransport::new();
        let pipeline = pipeline_with(transport);
        let report = pipeline.process_file(&doc).await;

        assert!(report.is_ok());
        assert!(!report.written);
        assert!(!pipeline.annotator().backup_path(&doc).exists());
    }
}
