//! Watch mode
//!
//! File events arrive on a bounded queue. Each path is debounced on its own
//! timer; when it fires the document runs through link mode. A path never has
//! two runs at once: a timer that fires during a run is re-armed once the run
//! finishes. Different paths run concurrently.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{BatchReport, FileReport, Pipeline};

/// Per-run reports kept in the watch report; older runs only count in totals
const RECENT_RUNS: usize = 100;

/// A change reported by the file watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Changed(PathBuf),
    Removed(PathBuf),
}

#[derive(Debug)]
pub struct WatchScheduler {
    pipeline: Pipeline,
    debounce: Duration,
}

impl WatchScheduler {
    pub fn new(pipeline: Pipeline, debounce: Duration) -> Self {
        Self { pipeline, debounce }
    }

    /// Bounded queue for feeding events into [`run`](Self::run)
    pub fn channel(capacity: usize) -> (mpsc::Sender<FileEvent>, mpsc::Receiver<FileEvent>) {
        mpsc::channel(capacity.max(1))
    }

    /// Consume events until the queue closes or `cancel` fires
    ///
    /// On close, pending timers still fire and running documents finish. On
    /// cancel, pending timers are dropped and running documents finish. The
    /// graph is checkpointed after every completed run.
    pub async fn run(self, mut events: mpsc::Receiver<FileEvent>, cancel: CancellationToken) -> BatchReport {
        let mut report = BatchReport::default();
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let mut running: HashSet<PathBuf> = HashSet::new();
        let mut rearm: HashSet<PathBuf> = HashSet::new();
        let mut tasks: JoinSet<FileReport> = JoinSet::new();
        let mut closed = false;

        info!(debounce_ms = self.debounce.as_millis() as u64, "Watching for changes");

        loop {
            if closed && pending.is_empty() && tasks.is_empty() {
                break;
            }
            let next_due = pending.values().min().copied();

            tokio::select! {
                _ = cancel.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                event = events.recv(), if !closed => match event {
                    Some(FileEvent::Changed(path)) => {
                        if self.pipeline.scanner().should_process(&path) {
                            debug!(path = %path.display(), "Change scheduled");
                            pending.insert(path, Instant::now() + self.debounce);
                        }
                    }
                    Some(FileEvent::Removed(path)) => {
                        pending.remove(&path);
                        rearm.remove(&path);
                    }
                    None => closed = true,
                },
                _ = sleep_until(next_due), if next_due.is_some() => {
                    let now = Instant::now();
                    let due: Vec<PathBuf> = pending
                        .iter()
                        .filter(|(_, at)| **at <= now)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in due {
                        pending.remove(&path);
                        if running.contains(&path) {
                            rearm.insert(path);
                            continue;
                        }
                        running.insert(path.clone());
                        let pipeline = self.pipeline.clone();
                        tasks.spawn(async move { pipeline.process_file(&path).await });
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.finish(joined, &mut report, &mut running, &mut rearm, &mut pending).await;
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            self.finish(joined, &mut report, &mut running, &mut rearm, &mut pending).await;
        }

        info!(runs = report.files_processed(), "Stopped watching");
        report
    }

    async fn finish(
        &self,
        joined: Result<FileReport, tokio::task::JoinError>,
        report: &mut BatchReport,
        running: &mut HashSet<PathBuf>,
        rearm: &mut HashSet<PathBuf>,
        pending: &mut HashMap<PathBuf, Instant>,
    ) {
        let file = match joined {
            Ok(file) => file,
            Err(e) => {
                error!(error = %e, "Watch task failed");
                return;
            }
        };

        running.remove(&file.path);
        if rearm.remove(&file.path) {
            pending.insert(file.path.clone(), Instant::now() + self.debounce);
        }

        match &file.error {
            Some(e) => warn!(path = %file.path.display(), code = %e.code, error = %e.message, "Watch run failed"),
            None => info!(
                path = %file.path.display(),
                markers = file.markers_added,
                written = file.written,
                "Watch run finished"
            ),
        }

        self.pipeline.checkpoint(report).await;
        report.push_recent(file, RECENT_RUNS);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
