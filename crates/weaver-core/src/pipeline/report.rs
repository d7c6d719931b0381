//! Run reports
//!
//! Per-file failures are reported here instead of aborting the run.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub code: String,
    pub message: String,
}

impl From<&Error> for ReportedError {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Outcome of one document in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    /// Links found, relationship markers excluded
    pub links: usize,
    /// Links whose line already carried a marker
    pub already_annotated: usize,
    pub markers_added: usize,
    pub keywords_linked: usize,
    /// Verdicts that came from the fallback rather than a real answer
    pub fallbacks: usize,
    /// Graph edges this document added
    pub edges_added: usize,
    pub written: bool,
    pub error: Option<ReportedError>,
}

impl FileReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn failed(path: impl Into<PathBuf>, error: &Error) -> Self {
        Self::new(path).with_error(error)
    }

    pub fn with_error(mut self, error: &Error) -> Self {
        self.error = Some(ReportedError::from(error));
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Counters folded in from file reports that are no longer kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunTotals {
    pub files: usize,
    pub failed: usize,
    pub written: usize,
    pub markers_added: usize,
    pub keywords_linked: usize,
    pub fallbacks: usize,
    pub edges_added: usize,
}

impl RunTotals {
    fn add(&mut self, file: &FileReport) {
        self.files += 1;
        self.failed += usize::from(!file.is_ok());
        self.written += usize::from(file.written);
        self.markers_added += file.markers_added;
        self.keywords_linked += file.keywords_linked;
        self.fallbacks += file.fallbacks;
        self.edges_added += file.edges_added;
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Outcome of a batch, keyword, rebuild or watch run
///
/// Counters cover every document of the run, including those folded into
/// `earlier` by [`push_recent`](Self::push_recent).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    #[serde(skip_serializing_if = "RunTotals::is_zero")]
    pub earlier: RunTotals,
    /// The run stopped early on cancellation
    pub cancelled: bool,
    pub graph_saved: bool,
    pub graph_error: Option<ReportedError>,
}

impl BatchReport {
    /// Keep `file`, folding the oldest reports into the totals beyond `keep`
    pub fn push_recent(&mut self, file: FileReport, keep: usize) {
        self.files.push(file);
        if self.files.len() > keep {
            let excess = self.files.len() - keep;
            for old in self.files.drain(..excess) {
                self.earlier.add(&old);
            }
        }
    }

    pub fn files_processed(&self) -> usize {
        self.earlier.files + self.files.len()
    }

    pub fn files_failed(&self) -> usize {
        self.earlier.failed + self.files.iter().filter(|f| !f.is_ok()).count()
    }

    pub fn files_written(&self) -> usize {
        self.earlier.written + self.files.iter().filter(|f| f.written).count()
    }

    pub fn markers_added(&self) -> usize {
        self.earlier.markers_added + self.files.iter().map(|f| f.markers_added).sum::<usize>()
    }

    pub fn keywords_linked(&self) -> usize {
        self.earlier.keywords_linked + self.files.iter().map(|f| f.keywords_linked).sum::<usize>()
    }

    pub fn fallbacks(&self) -> usize {
        self.earlier.fallbacks + self.files.iter().map(|f| f.fallbacks).sum::<usize>()
    }

    pub fn edges_added(&self) -> usize {
        self.earlier.edges_added + self.files.iter().map(|f| f.edges_added).sum::<usize>()
    }

    /// Failed documents among the reports still kept
    pub fn failures(&self) -> impl Iterator<Item = &FileReport> {
        self.files.iter().filter(|f| !f.is_ok())
    }
}
