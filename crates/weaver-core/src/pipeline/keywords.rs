//! Keyword mode
//!
//! Collects keyword candidates across a tree, groups them by normalized form
//! and asks the oracle whether each group names one concept. Confirmed groups
//! turn every occurrence into a wiki link and add a `Mentions` edge from each
//! document to the concept.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::annotate::AnnotationPlan;
use crate::domain::document::{KeywordOccurrence, cluster, concept_of};
use crate::domain::knowledge::{RelationshipRecord, RelationshipType};
use crate::error::Result;

use super::file::read_document;
use super::{BatchReport, FileReport, Pipeline};

/// Concept-group counts for a keyword run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConceptStats {
    pub groups: usize,
    pub confirmed: usize,
    pub fallbacks: usize,
}

/// Everything a confirmed group contributes to one document
#[derive(Default)]
struct Pending {
    wraps: Vec<(KeywordOccurrence, String)>,
    records: Vec<RelationshipRecord>,
}

impl Pipeline {
    /// Link repeated keywords under `root`
    pub async fn process_keywords(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(BatchReport, ConceptStats)> {
        let files = self.scan(root).await?;
        let mut report = BatchReport::default();
        let mut stats = ConceptStats::default();

        let mut texts: IndexMap<PathBuf, String> = IndexMap::new();
        let mut occurrences = Vec::new();
        for path in files {
            match read_document(&path).await {
                Ok(text) => {
                    occurrences.extend(self.extractor.extract(&path, &text).keywords);
                    texts.insert(path, text);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping document");
                    report.files.push(FileReport::failed(&path, &e));
                }
            }
        }

        let groups = cluster(occurrences, self.min_occurrences);
        stats.groups = groups.len();
        info!(documents = texts.len(), groups = groups.len(), "Clustered keyword candidates");

        let mut pending: IndexMap<PathBuf, Pending> = IndexMap::new();
        for group in &groups {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let verdict = self.oracle.same_concept(group).await;
            if verdict.origin.is_fallback() {
                stats.fallbacks += 1;
            }
            if !verdict.same {
                debug!(key = %group.key, "Keyword group is not one concept");
                continue;
            }
            stats.confirmed += 1;

            for member in &group.members {
                // A note does not link to itself
                if concept_of(&member.source_file) == group.key {
                    continue;
                }
                let entry = pending.entry(member.source_file.clone()).or_default();
                if entry.wraps.iter().all(|(seen, _)| seen.normalized != group.key) {
                    entry.records.push(
                        RelationshipRecord::new(
                            concept_of(&member.source_file),
                            &group.key,
                            RelationshipType::Mentions,
                        )
                        .with_context(member.context.clone())
                        .with_source_file(&member.source_file)
                        .with_confidence(verdict.confidence)
                        .with_origin(verdict.origin.clone()),
                    );
                }
                entry.wraps.push((member.clone(), group.key.clone()));
            }
        }

        for (path, mut work) in pending {
            let Some(text) = texts.shift_remove(&path) else {
                continue;
            };
            report.files.push(self.link_keywords(&path, text, &mut work).await);
        }

        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        self.checkpoint(&mut report).await;

        info!(
            groups = stats.groups,
            confirmed = stats.confirmed,
            linked = report.keywords_linked(),
            "Keyword run finished"
        );
        Ok((report, stats))
    }

    async fn link_keywords(&self, path: &Path, text: String, work: &mut Pending) -> FileReport {
        let mut report = FileReport::new(path);

        // Adjacent wraps rely on planning in offset order
        work.wraps.sort_by_key(|(occurrence, _)| occurrence.byte_start);
        let mut plan = AnnotationPlan::new(self.placement);
        for (occurrence, key) in &work.wraps {
            if plan.add_wrap(occurrence, key) {
                report.keywords_linked += 1;
            }
        }

        let _guard = self.locks.lock(path).await;
        match self
            .annotator
            .apply(path, plan.into_edits(), Some(text.into_bytes()))
            .await
        {
            Ok(outcome) => report.written = outcome.is_applied(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Keyword linking abandoned");
                report.keywords_linked = 0;
                return report.with_error(&e);
            }
        }

        report.edges_added = self
            .graph
            .merge_all(&work.records)
            .await
            .iter()
            .filter(|outcome| outcome.edge_changed)
            .count();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::ScriptedTransport;
    use crate::oracle::{OfflineOracle, OracleClient, RetryPolicy};
    use crate::storage::GraphStore;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn two_notes() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.md"), "今天，焦虑\n").unwrap();
        fs::write(dir.path().join("b.md"), "焦虑，失眠\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_links_keyword_across_two_files() {
        let dir = two_notes();
        let pipeline = Pipeline::new(
            &Config::default(),
            Arc::new(OfflineOracle::new()),
            GraphStore::in_memory(),
        );

        let (report, stats) = pipeline
            .process_keywords(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.confirmed, 1);
        assert_eq!(report.keywords_linked(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "今天，[[焦虑]]\n");
        assert_eq!(fs::read_to_string(dir.path().join("b.md")).unwrap(), "[[焦虑]]，失眠\n");

        let snapshot = pipeline.graph().snapshot().await;
        assert_eq!(snapshot.edges.len(), 2);
        assert!(snapshot.edges.iter().all(|e| e.target == "焦虑"));
    }

    #[tokio::test]
    async fn test_rejected_group_changes_nothing() {
        let dir = two_notes();
        let oracle = OracleClient::new(ScriptedTransport::always("否")).with_policy(RetryPolicy::no_retry());
        let pipeline = Pipeline::new(&Config::default(), Arc::new(oracle), GraphStore::in_memory());

        let (report, stats) = pipeline
            .process_keywords(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.confirmed, 0);
        assert!(report.files.is_empty());
        assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "今天，焦虑\n");
        assert!(pipeline.graph().snapshot().await.edges.is_empty());
    }

    #[tokio::test]
    async fn test_second_run_is_a_no_op() {
        let dir = two_notes();
        let pipeline = Pipeline::new(
            &Config::default(),
            Arc::new(OfflineOracle::new()),
            GraphStore::in_memory(),
        );
        let cancel = CancellationToken::new();

        pipeline.process_keywords(dir.path(), &cancel).await.unwrap();
        let (report, stats) = pipeline.process_keywords(dir.path(), &cancel).await.unwrap();

        assert_eq!(stats.groups, 0);
        assert_eq!(report.files_written(), 0);
        assert_eq!(fs::read_to_string(dir.path().join("a.md")).unwrap(), "今天，[[焦虑]]\n");
    }

    #[tokio::test]
    async fn test_code_blocks_are_never_wrapped() {
        let dir = TempDir::new().unwrap();
        let a = "今天，焦虑\n```text\nanxiety_level = 焦虑\n```\n";
        let b = "焦虑，`焦虑` 失眠\n~~~\n焦虑\n~~~\n";
        fs::write(dir.path().join("a.md"), a).unwrap();
        fs::write(dir.path().join("b.md"), b).unwrap();
        let pipeline = Pipeline::new(
            &Config::default(),
            Arc::new(OfflineOracle::new()),
            GraphStore::in_memory(),
        );

        pipeline
            .process_keywords(dir.path(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("a.md")).unwrap(),
            "今天，[[焦虑]]\n```text\nanxiety_level = 焦虑\n```\n"
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("b.md")).unwrap(),
            "[[焦虑]]，`焦虑` 失眠\n~~~\n焦虑\n~~~\n"
        );
    }
}
