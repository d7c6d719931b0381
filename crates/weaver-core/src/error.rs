//! Error types for Cognitive Weaver

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using Cognitive Weaver's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Cognitive Weaver error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Corpus errors (E001-E099)
    #[error("Cannot read root directory '{path}': {1}. Check the path passed to `weaver`.", path = .0.display())]
    RootUnreadable(PathBuf, String),

    #[error("Document '{path}' not found.", path = .0.display())]
    DocumentNotFound(PathBuf),

    // Oracle errors (E100-E199)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}")]
    LLMError(String),

    #[error("Rate limited by the provider (it suggested waiting {0} seconds).")]
    RateLimited(u64),

    #[error("Unparseable oracle reply: {0}")]
    UnparseableReply(String),

    #[error("LLM provider returned HTTP {status}: {message}")]
    ProviderStatus { status: u16, message: String },

    // Annotation errors (E300-E399)
    #[error("Backup of '{path}' failed: {1}. The document was left unmodified.", path = .0.display())]
    BackupFailed(PathBuf, String),

    #[error("Writing '{path}' failed: {1}. The document was left unmodified.", path = .0.display())]
    WriteFailed(PathBuf, String),

    #[error("Document '{path}' changed while it was being processed.", path = .0.display())]
    StaleDocument(PathBuf),

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("No backup found for '{path}'.", path = .0.display())]
    BackupNotFound(PathBuf),

    // Graph errors (E400-E499)
    #[error("Knowledge graph file '{path}' is invalid: {1}", path = .0.display())]
    GraphFormat(PathBuf, String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // User errors (E700-E799)
    #[error("Run cancelled")]
    Cancelled,

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::RootUnreadable(..) => "E001",
            Self::DocumentNotFound(_) => "E002",
            Self::NetworkError(_) => "E100",
            Self::LLMError(_) => "E101",
            Self::RateLimited(_) => "E102",
            Self::UnparseableReply(_) => "E103",
            Self::ProviderStatus { .. } => "E104",
            Self::BackupFailed(..) => "E300",
            Self::WriteFailed(..) => "E301",
            Self::StaleDocument(_) => "E302",
            Self::InvalidEdit(_) => "E303",
            Self::BackupNotFound(_) => "E304",
            Self::GraphFormat(..) => "E400",
            Self::ConfigError(_) => "E600",
            Self::Cancelled => "E700",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) | Self::Json(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NetworkError(_) => Some("Check internet connection or run with --offline".to_string()),
            Self::ProviderStatus { status: 401 | 403, .. } => Some("weaver config get llm.api_key".to_string()),
            Self::ProviderStatus { status: 404, .. } => Some("weaver config get llm.default_model".to_string()),
            Self::ProviderStatus { status: 402, .. } => Some("Top up the provider account or run with --offline".to_string()),
            Self::StaleDocument(path) => Some(format!("weaver process-folder {}", parent_display(path))),
            Self::BackupNotFound(_) => Some("Backups are only written when a document is annotated".to_string()),
            Self::GraphFormat(..) => Some("weaver rebuild-graph <vault>".to_string()),
            Self::ConfigError(_) => Some("weaver config init".to_string()),
            _ => None,
        }
    }

    /// Whether the oracle client may retry after this error
    ///
    /// Soft failures are network problems and timeouts, rate limiting,
    /// server-side errors, and malformed or unparseable replies. Any other HTTP
    /// status from the provider is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NetworkError(_) | Self::RateLimited(_) | Self::UnparseableReply(_) | Self::LLMError(_) => true,
            Self::ProviderStatus { status, .. } => *status == 408 || *status >= 500,
            _ => false,
        }
    }

    /// Server-suggested wait before the next attempt, if any
    pub fn suggested_wait_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited(secs) => Some(*secs),
            _ => None,
        }
    }
}

fn parent_display(path: &std::path::Path) -> String {
    path.parent()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| ".".to_string())
}
