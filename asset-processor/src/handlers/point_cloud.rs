//! Point cloud tiling with Schwarzwald.

use std::path::Path;
use std::sync::Arc;

use tokio::process::Command;

use super::input::locate_single_input;
use super::tool::{TailProgress, run_logged};
use crate::config::ServiceConfig;
use crate::jobs::{JobEntry, JobKind};
use crate::progress::LogProfile;
use crate::Result;
use crate::utils::fs::ensure_dir_all_with_op;

pub const TOOL: &str = "Schwarzwald";

/// Tile the job's LAS/LAZ file into an Entwine LAZ tree under the output directory.
pub async fn run(config: &ServiceConfig, entry: &Arc<JobEntry>) -> Result<()> {
    let paths = entry.paths();
    let input = locate_single_input(&paths.input_dir, JobKind::Cloud.input_extensions()).await?;
    ensure_dir_all_with_op("creating output directory", &paths.output_dir).await?;

    let cmd = build_command(config, &input, &paths.output_dir);
    let progress = LogProfile::for_kind(JobKind::Cloud).map(|profile| TailProgress {
        profile,
        interval: config.poll_interval,
    });
    run_logged(entry, TOOL, cmd, progress).await
}

pub fn build_command(config: &ServiceConfig, input: &Path, output_dir: &Path) -> Command {
    let tools = &config.tools;
    let mut cmd =
        process_utils::line_buffered_command(&tools.schwarzwald_path, tools.line_buffered);
    cmd.arg("--tiler")
        .arg("--cache-size")
        .arg(&tools.schwarzwald_cache_size)
        .args(["--output-format", "ENTWINE_LAZ"])
        .arg("-i")
        .arg(input)
        .arg("-o")
        .arg(output_dir);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_line_matches_tiler_invocation() {
        let mut config = ServiceConfig::default();
        config.tools.line_buffered = false;
        let cmd = build_command(
            &config,
            Path::new("/u/cloud/a/scan.las"),
            Path::new("/u/cloud/a/out"),
        );

        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), OsStr::new("Schwarzwald"));
        let args: Vec<_> = std_cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "--tiler",
                "--cache-size",
                "256MB",
                "--output-format",
                "ENTWINE_LAZ",
                "-i",
                "/u/cloud/a/scan.las",
                "-o",
                "/u/cloud/a/out",
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn line_buffering_wraps_in_stdbuf() {
        let config = ServiceConfig::default();
        let cmd = build_command(&config, Path::new("in.laz"), Path::new("out"));
        let std_cmd = cmd.as_std();
        assert_eq!(std_cmd.get_program(), OsStr::new("stdbuf"));
        let args: Vec<_> = std_cmd.get_args().take(2).collect();
        assert_eq!(args, [OsStr::new("-oL"), OsStr::new("Schwarzwald")]);
    }
}
