//! Backup sibling files
//!
//! A backup is `<file><suffix>` next to the document and always holds the
//! document's bytes from just before its most recent annotation.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};

/// Path of the backup for `path`
pub fn backup_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Write `bytes` as the backup of `path` and flush it to disk
pub fn write_backup(path: &Path, bytes: &[u8], suffix: &str) -> Result<PathBuf> {
    let backup = backup_path(path, suffix);
    let fail = |e: std::io::Error| Error::BackupFailed(path.to_path_buf(), e.to_string());

    let mut file = File::create(&backup).map_err(fail)?;
    file.write_all(bytes).map_err(fail)?;
    file.sync_all().map_err(fail)?;

    debug!(path = %path.display(), backup = %backup.display(), "Wrote backup");
    Ok(backup)
}

/// Move the backup of `path` back over the document
pub fn restore_backup(path: &Path, suffix: &str) -> Result<PathBuf> {
    let backup = backup_path(path, suffix);

    match fs::metadata(&backup) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(Error::BackupNotFound(backup)),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::BackupNotFound(backup)),
        Err(e) => return Err(Error::WriteFailed(path.to_path_buf(), e.to_string())),
    }

    fs::rename(&backup, path).map_err(|e| Error::WriteFailed(path.to_path_buf(), e.to_string()))?;
    info!(path = %path.display(), "Restored document from backup");
    Ok(backup)
}
