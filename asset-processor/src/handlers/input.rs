//! Input discovery for conversion handlers.

use std::path::{Path, PathBuf};

use crate::utils::fs::{file_exists, io_error};
use crate::{Error, Result};

/// Find the single regular file directly under `dir` whose extension
/// (compared case-insensitively) is one of `extensions`.
///
/// Zero or several candidates is an [`Error::InputCardinality`].
pub async fn locate_single_input(dir: &Path, extensions: &[&str]) -> Result<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error("reading input directory", dir, e))?;

    let mut candidates = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("reading input directory", dir, e))?
    {
        let path = entry.path();
        if has_extension(&path, extensions) && file_exists(&path).await {
            candidates.push(path);
        }
    }

    if candidates.len() == 1
        && let Some(input) = candidates.pop()
    {
        return Ok(input);
    }
    Err(Error::input_cardinality(dir, extensions, candidates.len()))
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// File name of `input` without its extension, for naming outputs.
pub fn output_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}
