//! Small process-related helpers shared across the workspace.
//!
//! Conversion tools are launched detached from any console window and with
//! their combined output appended to a per-job log file, which is what the
//! log-tail progress source reads back.

use std::ffi::OsStr;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::process::Stdio;

#[cfg(all(windows, feature = "tokio"))]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to spawned tools.
///
/// On non-Windows targets this is a no-op.
#[cfg(feature = "tokio")]
trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
#[cfg(feature = "tokio")]
fn tokio_command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

/// Build a command, optionally wrapped in `stdbuf -oL` so that tools which
/// block-buffer when not attached to a terminal still flush line by line.
#[cfg(feature = "tokio")]
pub fn line_buffered_command(
    program: impl AsRef<OsStr>,
    line_buffered: bool,
) -> tokio::process::Command {
    if line_buffered && cfg!(unix) {
        let mut cmd = tokio_command("stdbuf");
        cmd.arg("-oL").arg(program);
        cmd
    } else {
        tokio_command(program)
    }
}

/// Open `path` for appending, creating it when missing.
pub fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Stdio handles that send both stdout and stderr of a child to the same file.
///
/// Both handles share one file description opened in append mode, so
/// interleaved writes from the two streams never overwrite each other.
pub struct LogRedirect {
    pub stdout: Stdio,
    pub stderr: Stdio,
}

impl LogRedirect {
    /// Open (or create) `path` and prepare stdout/stderr handles for it.
    pub fn append_to(path: &Path) -> io::Result<Self> {
        let file = open_append(path)?;
        let stderr = file.try_clone()?;
        Ok(Self {
            stdout: Stdio::from(file),
            stderr: Stdio::from(stderr),
        })
    }
}

/// Redirect stdout and stderr of `cmd` into the log file at `path`.
///
/// Stdin is closed; conversion tools never read from it.
#[cfg(feature = "tokio")]
pub fn redirect_output(cmd: &mut tokio::process::Command, path: &Path) -> io::Result<()> {
    let redirect = LogRedirect::append_to(path)?;
    cmd.stdin(Stdio::null())
        .stdout(redirect.stdout)
        .stderr(redirect.stderr);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn open_append_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.log");
        std::fs::write(&path, "first\n").unwrap();

        let mut file = open_append(&path).unwrap();
        writeln!(file, "second").unwrap();
        drop(file);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }

    #[cfg(all(unix, feature = "tokio"))]
    #[tokio::test]
    async fn redirect_output_captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.log");

        let mut cmd = tokio_command("sh");
        cmd.arg("-c").arg("echo out; echo err 1>&2");
        redirect_output(&mut cmd, &path).unwrap();
        let status = cmd.status().await.unwrap();
        assert!(status.success());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("out"));
        assert!(content.contains("err"));
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn tokio_command_runs_program_directly() {
        let cmd = tokio_command("splat-transform");
        assert_eq!(cmd.as_std().get_program(), "splat-transform");
        assert_eq!(cmd.as_std().get_args().count(), 0);
    }

    #[cfg(feature = "tokio")]
    #[test]
    fn line_buffered_wraps_program_on_unix() {
        let cmd = line_buffered_command("Schwarzwald", true);
        let program = cmd.as_std().get_program().to_string_lossy().into_owned();
        if cfg!(unix) {
            assert_eq!(program, "stdbuf");
        } else {
            assert_eq!(program, "Schwarzwald");
        }

        let plain = line_buffered_command("Schwarzwald", false);
        assert_eq!(plain.as_std().get_program(), "Schwarzwald");
    }
}
