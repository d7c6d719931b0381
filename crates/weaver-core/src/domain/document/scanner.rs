//! Document discovery
//!
//! Walks a vault directory and yields the note files worth processing. The
//! same filter is used for file-change events in watch mode.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::{Config, ScanConfig};
use crate::error::{Error, Result};

/// Prefix used by in-progress temp files written next to documents
const TEMP_FILE_PREFIX: &str = ".tmp";

#[derive(Debug, Clone)]
pub struct Scanner {
    extensions: Vec<String>,
    ignore_patterns: Vec<String>,
    backup_suffix: String,
}

impl Scanner {
    pub fn new(scan: &ScanConfig, backup_suffix: impl Into<String>) -> Self {
        Self {
            extensions: scan
                .extensions
                .iter()
                .map(|ext| normalize_extension(ext))
                .collect(),
            ignore_patterns: scan
                .ignore_patterns
                .iter()
                .map(|p| p.replace('\\', "/"))
                .collect(),
            backup_suffix: backup_suffix.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.scan, config.annotate.backup_suffix.clone())
    }

    /// Whether `path` names a document this tool should touch
    pub fn should_process(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };

        if name.starts_with(TEMP_FILE_PREFIX) || name.ends_with(&self.backup_suffix) {
            return false;
        }

        let extension = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!(".{}", ext.to_lowercase()),
            None => return false,
        };
        if !self.extensions.contains(&extension) {
            return false;
        }

        let normalized = format!("/{}", path.to_string_lossy().replace('\\', "/"));
        !self
            .ignore_patterns
            .iter()
            .any(|pattern| normalized.contains(pattern.as_str()))
    }

    /// All processable documents under `root`, sorted
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let metadata = fs::metadata(root)
            .map_err(|e| Error::RootUnreadable(root.to_path_buf(), e.to_string()))?;
        if !metadata.is_dir() {
            return Err(Error::RootUnreadable(
                root.to_path_buf(),
                "not a directory".to_string(),
            ));
        }

        let mut documents = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(root = %root.display(), error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if entry.file_type().is_file() && self.should_process(entry.path()) {
                documents.push(entry.into_path());
            }
        }

        documents.sort();
        debug!(root = %root.display(), documents = documents.len(), "Scanned vault");
        Ok(documents)
    }
}

/// Scan `root` with the default backup suffix
pub fn scan(root: &Path, config: &ScanConfig) -> Result<Vec<PathBuf>> {
    Scanner::new(config, ".bak").scan(root)
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "# note\n").unwrap();
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        touch(root, "b.md");
        touch(root, "a.md");
        touch(root, "sub/c.MD");
        touch(root, "a.md.bak");
        touch(root, "notes.txt");
        touch(root, ".git/objects/x.md");
        touch(root, ".obsidian/workspace.md");
        touch(root, ".weaver/cache.md");
        touch(root, ".tmpAbc123.md");

        let found = scan(root, &ScanConfig::default()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();

        assert_eq!(names, vec!["a.md", "b.md", "sub/c.MD"]);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        let err = scan(&dir.path().join("nope"), &ScanConfig::default()).unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_file_root_is_fatal() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.md");
        let err = scan(&dir.path().join("a.md"), &ScanConfig::default()).unwrap_err();
        assert!(matches!(err, Error::RootUnreadable(..)));
    }

    #[test]
    fn test_should_process() {
        let scanner = Scanner::new(&ScanConfig::default(), ".bak");
        assert!(scanner.should_process(Path::new("/vault/关系.md")));
        assert!(scanner.should_process(Path::new("relative/note.md")));
        assert!(!scanner.should_process(Path::new("/vault/关系.md.bak")));
        assert!(!scanner.should_process(Path::new("/vault/.git/HEAD.md")));
        assert!(!scanner.should_process(Path::new(".obsidian/app.md")));
        assert!(!scanner.should_process(Path::new("/vault/README")));
    }

    #[test]
    fn test_custom_extensions_without_dot() {
        let config = ScanConfig {
            extensions: vec!["markdown".to_string(), ".MD".to_string()],
            ..ScanConfig::default()
        };
        let scanner = Scanner::new(&config, ".orig");
        assert!(scanner.should_process(Path::new("a.markdown")));
        assert!(scanner.should_process(Path::new("a.md")));
        assert!(!scanner.should_process(Path::new("a.md.orig")));
    }
}
