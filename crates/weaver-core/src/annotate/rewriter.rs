//! In-place document rewriting
//!
//! Every mutation follows the same protocol:
//! 1. read the current bytes (and compare with what the caller extracted from)
//! 2. validate all edit offsets against those bytes
//! 3. write and fsync the backup sibling
//! 4. apply edits from the highest offset down
//! 5. write a temp file in the same directory and rename it over the document
//!
//! A failure at any step leaves the document untouched.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

use super::backup;
use super::plan::Edit;

/// What an apply did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// No edits; the document and its backup were not touched
    Unchanged,
    Applied { edits: usize, backup: PathBuf },
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Annotator {
    backup_suffix: String,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(".bak")
    }
}

impl Annotator {
    pub fn new(backup_suffix: impl Into<String>) -> Self {
        Self {
            backup_suffix: backup_suffix.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.annotate.backup_suffix.clone())
    }

    pub fn backup_suffix(&self) -> &str {
        &self.backup_suffix
    }

    pub fn backup_path(&self, path: &Path) -> PathBuf {
        backup::backup_path(path, &self.backup_suffix)
    }

    /// Apply `edits` to the document at `path`
    ///
    /// When `expected` is given and the document no longer holds exactly those
    /// bytes, nothing is written and `StaleDocument` is returned.
    pub async fn apply(&self, path: &Path, edits: Vec<Edit>, expected: Option<Vec<u8>>) -> Result<ApplyOutcome> {
        if edits.is_empty() {
            return Ok(ApplyOutcome::Unchanged);
        }

        let path = path.to_path_buf();
        let suffix = self.backup_suffix.clone();
        tokio::task::spawn_blocking(move || apply_blocking(&path, &edits, expected.as_deref(), &suffix))
            .await
            .map_err(|e| Error::Other(format!("Annotate task failed: {}", e)))?
    }

    /// Put the last backup of `path` back in place
    pub async fn restore(&self, path: &Path) -> Result<PathBuf> {
        let path = path.to_path_buf();
        let suffix = self.backup_suffix.clone();
        tokio::task::spawn_blocking(move || backup::restore_backup(&path, &suffix))
            .await
            .map_err(|e| Error::Other(format!("Restore task failed: {}", e)))?
    }
}

fn apply_blocking(path: &Path, edits: &[Edit], expected: Option<&[u8]>, suffix: &str) -> Result<ApplyOutcome> {
    let original = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::DocumentNotFound(path.to_path_buf())),
        Err(e) => return Err(Error::WriteFailed(path.to_path_buf(), e.to_string())),
    };

    if let Some(expected) = expected {
        if expected != original.as_slice() {
            return Err(Error::StaleDocument(path.to_path_buf()));
        }
    }

    let updated = apply_edits(&original, edits)?;

    let backup = backup::write_backup(path, &original, suffix)?;
    replace_atomically(path, updated.as_bytes())?;

    info!(path = %path.display(), edits = edits.len(), "Annotated document");
    Ok(ApplyOutcome::Applied {
        edits: edits.len(),
        backup,
    })
}

/// Insert every edit into `original`
///
/// Offsets refer to the original bytes and must fall on UTF-8 character
/// boundaries. Edits at the same offset keep their relative order.
pub fn apply_edits(original: &[u8], edits: &[Edit]) -> Result<String> {
    let text = std::str::from_utf8(original)
        .map_err(|e| Error::InvalidEdit(format!("document is not valid UTF-8: {}", e)))?;

    for edit in edits {
        if edit.offset > text.len() {
            return Err(Error::InvalidEdit(format!(
                "offset {} is past the end of the document ({} bytes)",
                edit.offset,
                text.len()
            )));
        }
        if !text.is_char_boundary(edit.offset) {
            return Err(Error::InvalidEdit(format!(
                "offset {} is not on a character boundary",
                edit.offset
            )));
        }
    }

    let mut ordered: Vec<&Edit> = edits.iter().collect();
    ordered.sort_by_key(|edit| edit.offset);

    // Inserting from the back keeps earlier offsets valid; at equal offsets the
    // later edit goes in first so the earlier one ends up in front of it.
    let mut updated = text.to_string();
    for edit in ordered.iter().rev() {
        updated.insert_str(edit.offset, &edit.text);
    }
    Ok(updated)
}

fn replace_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let fail = |e: std::io::Error| Error::WriteFailed(path.to_path_buf(), e.to_string());

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path).map_err(fail)?.permissions();

    let mut temp = NamedTempFile::new_in(dir).map_err(fail)?;
    temp.write_all(contents).map_err(fail)?;
    temp.as_file().set_permissions(permissions).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;
    temp.persist(path).map_err(|e| fail(e.error))?;

    debug!(path = %path.display(), bytes = contents.len(), "Replaced document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LINE: &str = "关系不会在乎事实如何，只在乎[[感受]]。";

    #[test]
    fn test_apply_edits_in_offset_order() {
        let edits = vec![Edit::new(5, "!"), Edit::new(0, ">"), Edit::new(11, " end")];
        assert_eq!(apply_edits(b"hello world", &edits).unwrap(), ">hello! world end");
    }

    #[test]
    fn test_same_offset_keeps_plan_order() {
        let edits = vec![Edit::new(3, "]]"), Edit::new(3, "[[")];
        assert_eq!(apply_edits(b"abcdef", &edits).unwrap(), "abc]][[def");
    }

    #[test]
    fn test_rejects_bad_offsets() {
        let err = apply_edits("焦虑".as_bytes(), &[Edit::new(1, "x")]).unwrap_err();
        assert_eq!(err.code(), "E303");
        assert!(apply_edits(b"abc", &[Edit::new(4, "x")]).is_err());
        assert!(apply_edits(&[0xff, 0xfe], &[Edit::new(0, "x")]).is_err());
    }

    #[tokio::test]
    async fn test_apply_writes_backup_then_document() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("关系.md");
        fs::write(&doc, LINE).unwrap();

        let annotator = Annotator::default();
        let outcome = annotator
            .apply(&doc, vec![Edit::new(LINE.len(), " [[支撑观点]]")], Some(LINE.as_bytes().to_vec()))
            .await
            .unwrap();

        assert!(outcome.is_applied());
        assert_eq!(
            fs::read_to_string(&doc).unwrap(),
            "关系不会在乎事实如何，只在乎[[感受]]。 [[支撑观点]]"
        );
        assert_eq!(fs::read_to_string(annotator.backup_path(&doc)).unwrap(), LINE);
    }

    #[tokio::test]
    async fn test_empty_edits_do_nothing() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "text").unwrap();

        let annotator = Annotator::default();
        let outcome = annotator.apply(&doc, Vec::new(), None).await.unwrap();
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert!(!annotator.backup_path(&doc).exists());
    }

    #[tokio::test]
    async fn test_stale_document_is_not_touched() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "edited by the user").unwrap();

        let annotator = Annotator::default();
        let err = annotator
            .apply(&doc, vec![Edit::new(0, "x")], Some(b"old text".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StaleDocument(_)));
        assert_eq!(fs::read_to_string(&doc).unwrap(), "edited by the user");
        assert!(!annotator.backup_path(&doc).exists());
    }

    #[tokio::test]
    async fn test_invalid_edit_leaves_no_backup() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "abc").unwrap();

        let annotator = Annotator::default();
        assert!(annotator.apply(&doc, vec![Edit::new(99, "x")], None).await.is_err());
        assert_eq!(fs::read_to_string(&doc).unwrap(), "abc");
        assert!(!annotator.backup_path(&doc).exists());
    }

    #[tokio::test]
    async fn test_missing_document() {
        let dir = TempDir::new().unwrap();
        let err = Annotator::default()
            .apply(&dir.path().join("gone.md"), vec![Edit::new(0, "x")], None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "E002");
    }

    #[tokio::test]
    async fn test_backup_is_overwritten_each_time() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("a.md");
        fs::write(&doc, "one").unwrap();

        let annotator = Annotator::new(".orig");
        annotator.apply(&doc, vec![Edit::new(3, " two")], None).await.unwrap();
        annotator.apply(&doc, vec![Edit::new(7, " three")], None).await.unwrap();

        assert_eq!(fs::read_to_string(&doc).unwrap(), "one two three");
        assert_eq!(fs::read_to_string(dir.path().join("a.md.orig")).unwrap(), "one two");

        annotator.restore(&doc).await.unwrap();
        assert_eq!(fs::read_to_string(&doc).unwrap(), "one two");
    }
}
