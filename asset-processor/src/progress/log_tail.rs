//! Log-tail progress source.
//!
//! A background task that polls the job log of an external tool on a fixed
//! tick, feeds complete lines through a [`LogProfile`] and writes the latest
//! progress into the job. An error marker fails the job immediately.

use std::io::SeekFrom;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::patterns::{LineSignal, LogProfile};
use crate::jobs::{JobEntry, JobState};

pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub fn clamp_poll_interval(interval: Duration) -> Duration {
    interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Polls a job log and mirrors the tool's progress into the job entry.
pub struct LogTailer {
    entry: Arc<JobEntry>,
    profile: LogProfile,
    interval: Duration,
    path: PathBuf,
    /// Bytes of the log consumed so far.
    offset: u64,
    /// Trailing bytes of an unterminated line.
    pending: Vec<u8>,
}

impl LogTailer {
    pub fn new(entry: Arc<JobEntry>, profile: LogProfile, interval: Duration) -> Self {
        let path = entry.paths().log_file.clone();
        Self {
            entry,
            profile,
            interval: clamp_poll_interval(interval),
            path,
            offset: 0,
            pending: Vec::new(),
        }
    }

    /// Start polling in a background task.
    pub fn spawn(self) -> TailerHandle {
        let token = CancellationToken::new();
        let task = tokio::spawn(self.run(token.clone()));
        TailerHandle { token, task }
    }

    async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    // The tool has exited; pick up whatever it wrote last.
                    let _ = self.poll(true).await;
                    break;
                }
                _ = ticker.tick() => {
                    if self.poll(false).await.is_break() {
                        break;
                    }
                }
            }
        }

        debug!(
            job_id = %self.entry.id(),
            progress = self.entry.progress(),
            "Log tailer stopped"
        );
    }

    /// Consume new log content. Breaks once the job has left PROCESSING.
    ///
    /// An unterminated last line is only considered on the final read.
    async fn poll(&mut self, final_read: bool) -> ControlFlow<()> {
        if self.entry.state() != JobState::Processing {
            return ControlFlow::Break(());
        }

        match self.read_new().await {
            Ok(chunk) => self.pending.extend_from_slice(&chunk),
            Err(e) => {
                debug!(
                    job_id = %self.entry.id(),
                    path = %self.path.display(),
                    error = %e,
                    "Job log not readable yet"
                );
                return ControlFlow::Continue(());
            }
        }

        let lines: Vec<u8> = if final_read {
            std::mem::take(&mut self.pending)
        } else {
            let complete = self
                .pending
                .iter()
                .rposition(|&b| b == b'\n')
                .map_or(0, |pos| pos + 1);
            self.pending.drain(..complete).collect()
        };
        if lines.is_empty() {
            return ControlFlow::Continue(());
        }

        let text = String::from_utf8_lossy(&lines);
        let mut latest = None;
        for line in text.lines() {
            match self.profile.inspect_line(line) {
                Some(LineSignal::Error) => {
                    if let Some(value) = latest {
                        self.entry.set_progress(value);
                    }
                    let line = line.trim();
                    warn!(
                        job_id = %self.entry.id(),
                        tool = self.profile.tool(),
                        line,
                        "Error reported in tool log"
                    );
                    self.entry
                        .fail(format!("{} reported an error: {line}", self.profile.tool()));
                    return ControlFlow::Break(());
                }
                Some(LineSignal::Progress(value)) => latest = Some(value),
                None => {}
            }
        }

        if let Some(value) = latest
            && self.entry.set_progress(value)
        {
            trace!(job_id = %self.entry.id(), progress = value, "Progress updated");
        }
        ControlFlow::Continue(())
    }

    async fn read_new(&mut self) -> std::io::Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        let len = file.metadata().await?.len();
        if len < self.offset {
            // Truncated or replaced; start over.
            self.offset = 0;
            self.pending.clear();
        }

        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut chunk = Vec::with_capacity((len - self.offset) as usize);
        file.read_to_end(&mut chunk).await?;
        self.offset += chunk.len() as u64;
        Ok(chunk)
    }
}

/// Handle to a running [`LogTailer`].
pub struct TailerHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl TailerHandle {
    /// Stop polling after one final read, and wait for the task to exit.
    pub async fn finish(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Log tailer task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;
    use std::io::Write;
    use tempfile::TempDir;

    fn processing_entry(base: &TempDir) -> Arc<JobEntry> {
        let entry = Arc::new(JobEntry::new("scan", JobKind::Cloud, base.path()));
        std::fs::create_dir_all(&entry.paths().input_dir).unwrap();
        assert!(entry.begin_processing());
        entry
    }

    fn append(entry: &JobEntry, text: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&entry.paths().log_file)
            .unwrap();
        file.write_all(text.as_bytes()).unwrap();
    }

    fn tailer(entry: &Arc<JobEntry>) -> LogTailer {
        LogTailer::new(Arc::clone(entry), LogProfile::schwarzwald(), MIN_POLL_INTERVAL)
    }

    #[test]
    fn poll_interval_is_clamped() {
        assert_eq!(clamp_poll_interval(Duration::from_millis(5)), MIN_POLL_INTERVAL);
        assert_eq!(clamp_poll_interval(Duration::from_secs(3)), MAX_POLL_INTERVAL);
        assert_eq!(clamp_poll_interval(DEFAULT_POLL_INTERVAL), DEFAULT_POLL_INTERVAL);
    }

    #[tokio::test]
    async fn last_matching_line_wins() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        append(&entry, "Starting\n[10%] Processed\nwriting tiles\n[55%] Processed\n");

        let mut tailer = tailer(&entry);
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 55.0);
        assert_eq!(entry.state(), JobState::Processing);
    }

    #[tokio::test]
    async fn missing_log_is_tolerated() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        let mut tailer = tailer(&entry);
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 0.0);
    }

    #[tokio::test]
    async fn unterminated_line_waits_for_final_read() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        let mut tailer = tailer(&entry);

        append(&entry, "[t] indexing: 1.5M / 3");
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 0.0);

        append(&entry, "M points\n[t] indexing: 2.4M / 3");
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 50.0);

        append(&entry, "M points");
        assert!(tailer.poll(true).await.is_continue());
        assert_eq!(entry.progress(), 80.0);
    }

    #[tokio::test]
    async fn error_marker_fails_job_and_keeps_progress() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        append(&entry, "[30%] Processed\n");

        let mut tailer = tailer(&entry);
        assert!(tailer.poll(false).await.is_continue());
        append(&entry, "terminate called after throwing an instance of 'std::bad_alloc'\n");
        assert!(tailer.poll(false).await.is_break());

        assert_eq!(entry.state(), JobState::Error);
        assert_eq!(entry.progress(), 30.0);
        assert!(entry.message().unwrap().contains("terminate called"));
    }

    #[tokio::test]
    async fn truncated_log_is_read_from_start() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        append(&entry, "[20%] Processed\n[25%] Processed\n");

        let mut tailer = tailer(&entry);
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 25.0);

        std::fs::write(&entry.paths().log_file, "[60%] Processed\n").unwrap();
        assert!(tailer.poll(false).await.is_continue());
        assert_eq!(entry.progress(), 60.0);
    }

    #[tokio::test]
    async fn finish_performs_final_read() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        let handle = LogTailer::new(
            Arc::clone(&entry),
            LogProfile::schwarzwald(),
            MAX_POLL_INTERVAL,
        )
        .spawn();

        append(&entry, "[10%] Processed\n[55%] Processed");
        handle.finish().await;

        assert_eq!(entry.progress(), 55.0);
        assert_eq!(entry.state(), JobState::Processing);
    }

    #[tokio::test]
    async fn tailer_stops_once_job_settles() {
        let base = TempDir::new().unwrap();
        let entry = processing_entry(&base);
        let handle = tailer(&entry).spawn();

        entry.complete();
        tokio::time::timeout(Duration::from_secs(2), handle.finish())
            .await
            .expect("tailer should stop");
    }
}
