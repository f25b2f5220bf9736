//! OBJ to GLB conversion through the in-process mesh pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use mesh_transform::{MeshDocument, obj_to_glb_pipeline};
use pipeline_common::{CancellationToken, PipelineContext};
use tracing::info;

use super::input::{locate_single_input, output_stem};
use crate::jobs::{JobEntry, JobKind};
use crate::progress::StagedProgress;
use crate::utils::fs::ensure_dir_all_with_op;
use crate::{Error, Result};

/// Convert the job's OBJ into `<out>/<stem>.glb`, reporting one step per stage.
///
/// The pipeline is CPU bound and runs on the blocking pool. `shutdown` stops
/// it between stages when the service is going down.
pub async fn run(entry: &Arc<JobEntry>, shutdown: CancellationToken) -> Result<()> {
    let paths = entry.paths();
    let input = locate_single_input(&paths.input_dir, JobKind::Model.input_extensions()).await?;
    ensure_dir_all_with_op("creating output directory", &paths.output_dir).await?;

    let output = output_path(&input, &paths.output_dir);
    let context = Arc::new(PipelineContext::with_name(entry.id(), shutdown));
    let observer = StagedProgress::new(Arc::clone(entry));
    let document = MeshDocument::new(input, output);

    let document = tokio::task::spawn_blocking(move || {
        obj_to_glb_pipeline(context).run(document, &observer)
    })
    .await
    .map_err(|e| Error::Other(format!("Mesh pipeline task failed: {e}")))??;

    info!(
        job_id = %entry.id(),
        output = %document.output.display(),
        vertices = document.mesh.vertex_count(),
        triangles = document.mesh.triangle_count(),
        materials = document.materials.len(),
        textures = document.textures.len(),
        "Mesh converted"
    );
    Ok(())
}

pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.glb", output_stem(input)))
}
