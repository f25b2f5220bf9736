//! Gaussian splat compression with splat-transform.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::process::Command;

use super::input::{locate_single_input, output_stem};
use super::tool::run_logged;
use crate::config::ServiceConfig;
use crate::jobs::{JobEntry, JobKind};
use crate::Result;
use crate::utils::fs::ensure_dir_all_with_op;

pub const TOOL: &str = "splat-transform";

/// Rotate and compress the job's splat into `<out>/<stem>.compressed.ply`.
///
/// splat-transform prints no parsable progress, so the job reports 0 until it settles.
pub async fn run(config: &ServiceConfig, entry: &Arc<JobEntry>) -> Result<()> {
    let paths = entry.paths();
    let input = locate_single_input(&paths.input_dir, JobKind::Splat.input_extensions()).await?;
    ensure_dir_all_with_op("creating output directory", &paths.output_dir).await?;

    let output = output_path(&input, &paths.output_dir);
    let cmd = build_command(config, &input, &output);
    run_logged(entry, TOOL, cmd, None).await
}

pub fn output_path(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.compressed.ply", output_stem(input)))
}

pub fn build_command(config: &ServiceConfig, input: &Path, output: &Path) -> Command {
    let tools = &config.tools;
    let mut cmd =
        process_utils::line_buffered_command(&tools.splat_transform_path, tools.line_buffered);
    cmd.arg(input).arg("-r").arg(&tools.splat_rotation).arg(output);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_compressed_ply_named_after_input() {
        let out = output_path(Path::new("/u/splat/x/garden.splat"), Path::new("/u/splat/x/out"));
        assert_eq!(out, Path::new("/u/splat/x/out/garden.compressed.ply"));
    }

    #[test]
    fn command_applies_rotation() {
        let mut config = ServiceConfig::default();
        config.tools.line_buffered = false;
        let cmd = build_command(&config, Path::new("in.ply"), Path::new("out/in.compressed.ply"));
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, ["in.ply", "-r", "0,0,180", "out/in.compressed.ply"]);
    }
}
