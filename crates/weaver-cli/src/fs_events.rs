//! Bridge from OS file notifications to the watch queue

use std::path::Path;

use anyhow::Context;
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use weaver_core::pipeline::FileEvent;

/// Start watching `root` recursively, forwarding events to `tx`
///
/// The returned watcher must be kept alive for events to keep flowing. A full
/// queue blocks the notifier thread until the scheduler catches up.
pub fn watch(root: &Path, tx: mpsc::Sender<FileEvent>) -> anyhow::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
        Ok(event) => {
            for file_event in translate(&event) {
                if tx.blocking_send(file_event).is_err() {
                    debug!("Watch queue closed, dropping event");
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "File watcher error"),
    })
    .context("Failed to create file watcher")?;

    watcher
        .watch(root, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", root.display()))?;

    Ok(watcher)
}

/// Map one notification onto queue events
fn translate(event: &Event) -> Vec<FileEvent> {
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => event
            .paths
            .iter()
            .map(|path| FileEvent::Changed(path.clone()))
            .collect(),
        // Renames report both ends; whichever still exists has changed
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|path| {
                if path.exists() {
                    FileEvent::Changed(path.clone())
                } else {
                    FileEvent::Removed(path.clone())
                }
            })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .map(|path| FileEvent::Removed(path.clone()))
            .collect(),
        _ => Vec::new(),
    }
}
