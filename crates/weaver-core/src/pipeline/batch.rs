//! Link mode over a whole tree
//!
//! Documents run as tasks on a `JoinSet`, at most `max_concurrency` at a time.
//! Cancellation stops new documents from starting; documents already running
//! finish their write.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::Result;

use super::{BatchReport, Pipeline};

impl Pipeline {
    /// Process every document under `root`, then checkpoint the graph
    pub async fn process_folder(&self, root: &Path, cancel: &CancellationToken) -> Result<BatchReport> {
        self.process_folders(&[root.to_path_buf()], cancel).await
    }

    /// Process every document under each of `roots`
    ///
    /// A document reachable from two roots is processed once. Any unreadable
    /// root fails the whole call before a document is touched.
    pub async fn process_folders(&self, roots: &[PathBuf], cancel: &CancellationToken) -> Result<BatchReport> {
        let mut files = BTreeSet::new();
        for root in roots {
            files.extend(self.scan(root).await?);
        }
        info!(roots = roots.len(), documents = files.len(), "Processing folders");

        let mut report = self.process_files(files.into_iter().collect(), cancel).await;
        self.checkpoint(&mut report).await;

        info!(
            documents = report.files_processed(),
            written = report.files_written(),
            markers = report.markers_added(),
            failed = report.files_failed(),
            cancelled = report.cancelled,
            "Batch finished"
        );
        Ok(report)
    }

    /// Process `files` concurrently without checkpointing
    pub async fn process_files(&self, files: Vec<PathBuf>, cancel: &CancellationToken) -> BatchReport {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut report = BatchReport::default();

        for path in files {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let pipeline = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                pipeline.process_file(&path).await
            });
        }

        if report.cancelled {
            info!(in_flight = tasks.len(), "Cancelled, waiting for running documents");
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(file) => report.files.push(file),
                Err(e) => error!(error = %e, "Document task failed"),
            }
        }

        report.files.sort_by(|a, b| a.path.cmp(&b.path));
        report
    }
}
