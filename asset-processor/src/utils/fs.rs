//! Filesystem helpers shared across modules.
//!
//! These helpers attach the operation and path to IO errors so handler
//! failures read well in job messages.

use std::path::Path;

use crate::{Error, Result};

/// Convert an IO error into an application error with operation + path context.
pub fn io_error(op: &'static str, path: &Path, source: std::io::Error) -> Error {
    Error::io(op, path, source)
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir_all_with_op(op: &'static str, path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| io_error(op, path, e))
}

/// Blocking variant of [`ensure_dir_all_with_op`] for startup code.
pub fn ensure_dir_all_sync_with_op(op: &'static str, path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| io_error(op, path, e))
}

/// Whether `path` exists and is a directory. Follows symlinks.
pub async fn dir_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Whether `path` exists and is a regular file. Follows symlinks.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ensure_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("out");
        ensure_dir_all_with_op("creating output directory", &dir).await.unwrap();
        ensure_dir_all_with_op("creating output directory", &dir).await.unwrap();
        assert!(dir_exists(&dir).await);
    }

    #[tokio::test]
    async fn ensure_dir_reports_operation_and_path() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();

        let err = ensure_dir_all_with_op("creating output directory", &blocker.join("out"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("creating output directory"));
        assert!(message.contains("file"));
    }

    #[tokio::test]
    async fn existence_checks_distinguish_files_and_dirs() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("scan.las");
        std::fs::write(&file, b"x").unwrap();
        assert!(file_exists(&file).await);
        assert!(!dir_exists(&file).await);
        assert!(dir_exists(tmp.path()).await);
        assert!(!file_exists(&tmp.path().join("missing")).await);
    }
}
