//! IFC structural model conversion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use super::input::{locate_single_input, output_stem};
use crate::ifc;
use crate::jobs::{JobEntry, JobKind};
use crate::utils::fs::ensure_dir_all_with_op;
use crate::{Error, Result};

/// Index the job's IFC file into `<out>/<stem>.json`.
///
/// The conversion is a single blocking call without intermediate progress.
pub async fn run(entry: &Arc<JobEntry>) -> Result<()> {
    let paths = entry.paths();
    let input = locate_single_input(&paths.input_dir, JobKind::Ifc.input_extensions()).await?;
    ensure_dir_all_with_op("creating output directory", &paths.output_dir).await?;

    let output = output_path(&input, &paths.output_dir);
    let target = output.clone();
    let summary = tokio::task::spawn_blocking(move || ifc::convert_file(&input, &target))
        .await
        .map_err(|e| Error::Other(format!("IFC conversion task failed: {e}")))??;

    info!(
        job_id = %entry.id(),
        output = %output.display(),
        schema = summary.schema.as_deref().unwrap_or("unknown"),
        entities = summary.entity_count,
        elements = summary.elements.len(),
        "IFC converted"
    );
    Ok(())
}

pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.json", output_stem(input)))
}
