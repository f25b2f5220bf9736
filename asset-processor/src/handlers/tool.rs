//! Running external conversion tools.

use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{info, warn};

use crate::jobs::{JobEntry, JobState};
use crate::progress::{LogProfile, LogTailer};
use crate::{Error, Result};

/// Log-tail progress binding for a tool run.
pub(crate) struct TailProgress {
    pub profile: LogProfile,
    pub interval: Duration,
}

/// Run `cmd` to completion with stdout and stderr appended to the job log.
///
/// When `progress` is given a [`LogTailer`] runs for the lifetime of the
/// process and performs its final read before this returns.
pub(crate) async fn run_logged(
    entry: &Arc<JobEntry>,
    tool: &str,
    mut cmd: Command,
    progress: Option<TailProgress>,
) -> Result<()> {
    let log_file = &entry.paths().log_file;
    process_utils::redirect_output(&mut cmd, log_file)
        .map_err(|e| Error::io("opening job log", log_file, e))?;

    info!(
        job_id = %entry.id(),
        tool,
        command = ?cmd.as_std(),
        log = %log_file.display(),
        "Starting external tool"
    );
    let mut child = cmd
        .spawn()
        .map_err(|e| Error::external_tool(tool, format!("failed to start: {e}")))?;

    let tailer = progress
        .map(|p| LogTailer::new(Arc::clone(entry), p.profile, p.interval).spawn());

    let status = child.wait().await;
    if let Some(tailer) = tailer {
        tailer.finish().await;
    }
    let status =
        status.map_err(|e| Error::external_tool(tool, format!("failed to wait for exit: {e}")))?;

    if entry.state() == JobState::Error {
        warn!(
            job_id = %entry.id(),
            tool,
            status = %describe_exit(status),
            "Tool exited after reporting an error"
        );
    }

    if status.success() {
        info!(job_id = %entry.id(), tool, "External tool finished");
        Ok(())
    } else {
        Err(Error::external_tool(tool, describe_exit(status)))
    }
}

fn describe_exit(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exited with status {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    "terminated abnormally".to_string()
}
