//! Job entries and their state machine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Longest accepted job id, in bytes.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Kind of asset a job converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// LAS/LAZ point cloud, tiled by Schwarzwald.
    Cloud,
    /// OBJ mesh, converted to GLB in-process.
    Model,
    /// Gaussian splat, compressed by splat-transform.
    Splat,
    /// IFC structural model, indexed to JSON in-process.
    Ifc,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [Self::Cloud, Self::Model, Self::Splat, Self::Ifc];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cloud => "cloud",
            Self::Model => "model",
            Self::Splat => "splat",
            Self::Ifc => "ifc",
        }
    }

    /// Lower-case file extensions accepted as input.
    pub fn input_extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Cloud => &["las", "laz"],
            Self::Model => &["obj"],
            Self::Splat => &["ply", "splat", "ksplat", "spz"],
            Self::Ifc => &["ifc"],
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cloud" | "point-cloud" | "pointcloud" => Ok(Self::Cloud),
            "model" | "mesh" => Ok(Self::Model),
            "splat" => Ok(Self::Splat),
            "ifc" | "structural-model" | "bim" => Ok(Self::Ifc),
            _ => Err(Error::validation(format!(
                "Invalid type '{s}', expected one of: cloud, model, splat, ifc"
            ))),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Queued,
    Processing,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Done => "DONE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check that a caller-supplied id is safe to use as a single path component.
pub fn validate_job_id(id: &str) -> Result<()> {
    if id.is_empty() {
        return Err(Error::validation("Job id must not be empty"));
    }
    if id.len() > MAX_JOB_ID_LEN {
        return Err(Error::validation(format!(
            "Job id is longer than {MAX_JOB_ID_LEN} bytes"
        )));
    }
    if id == "." || id.contains("..") {
        return Err(Error::validation("Job id must not contain '..' or be '.'"));
    }
    if id.contains(['/', '\\']) {
        return Err(Error::validation("Job id must not contain path separators"));
    }
    if id.chars().any(char::is_control) {
        return Err(Error::validation("Job id must not contain control characters"));
    }
    Ok(())
}

/// Filesystem locations of a job, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_file: PathBuf,
}

impl JobPaths {
    pub fn input_dir_for(base: &Path, kind: JobKind, id: &str) -> PathBuf {
        base.join(kind.as_str()).join(id)
    }

    pub fn derive(base: &Path, kind: JobKind, id: &str, created_at: DateTime<Utc>) -> Self {
        let input_dir = Self::input_dir_for(base, kind, id);
        let output_dir = input_dir.join("out");
        let log_file = input_dir.join(format!("{id}_{}_log.txt", created_at.timestamp_millis()));
        Self {
            input_dir,
            output_dir,
            log_file,
        }
    }
}

#[derive(Debug)]
struct JobStatus {
    state: JobState,
    progress: f64,
    message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

/// One conversion request.
///
/// Identity and paths are immutable; state, progress and timestamps sit
/// behind a per-entry lock that is never held across an `.await`.
#[derive(Debug)]
pub struct JobEntry {
    id: String,
    kind: JobKind,
    created_at: DateTime<Utc>,
    paths: JobPaths,
    status: Mutex<JobStatus>,
}

impl JobEntry {
    pub fn new(id: impl Into<String>, kind: JobKind, base: &Path) -> Self {
        Self::with_created_at(id, kind, base, Utc::now())
    }

    pub fn with_created_at(
        id: impl Into<String>,
        kind: JobKind,
        base: &Path,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        let paths = JobPaths::derive(base, kind, &id, created_at);
        Self {
            id,
            kind,
            created_at,
            paths,
            status: Mutex::new(JobStatus {
                state: JobState::Queued,
                progress: 0.0,
                message: None,
                started_at: None,
                finished_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    pub fn state(&self) -> JobState {
        self.status.lock().state
    }

    pub fn progress(&self) -> f64 {
        self.status.lock().progress
    }

    pub fn message(&self) -> Option<String> {
        self.status.lock().message.clone()
    }

    /// QUEUED -> PROCESSING. Returns false for any other current state.
    pub(crate) fn begin_processing(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Queued {
            return false;
        }
        status.state = JobState::Processing;
        status.started_at = Some(Utc::now());
        true
    }

    /// Record progress while PROCESSING.
    ///
    /// Values are clamped to [0, 100]; lower values than the current one and
    /// NaN are ignored so progress never moves backwards.
    pub fn set_progress(&self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let mut status = self.status.lock();
        if status.state != JobState::Processing {
            return false;
        }
        let value = value.clamp(0.0, 100.0);
        if value < status.progress {
            return false;
        }
        status.progress = value;
        true
    }

    /// PROCESSING -> DONE.
    pub fn complete(&self) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Processing {
            return false;
        }
        status.state = JobState::Done;
        status.progress = 100.0;
        status.finished_at = Some(Utc::now());
        true
    }

    /// PROCESSING -> ERROR with a message.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        let mut status = self.status.lock();
        if status.state != JobState::Processing {
            return false;
        }
        let message = message.into();
        status.state = JobState::Error;
        status.message = Some(if message.trim().is_empty() {
            "Processing failed".to_string()
        } else {
            message
        });
        status.finished_at = Some(Utc::now());
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let status = self.status.lock();
        JobSnapshot {
            id: self.id.clone(),
            kind: self.kind,
            state: status.state,
            progress: status.progress,
            created_at: self.created_at,
            started_at: status.started_at,
            finished_at: status.finished_at,
            message: status.message.clone(),
        }
    }

    pub fn report(&self) -> ProgressReport {
        ProgressReport::from(&self.snapshot())
    }
}

/// Point-in-time view of a job, as listed by the queue endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub state: JobState,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Progress as reported to pollers.
///
/// DONE always reads 100 and ERROR always reads -1, whatever the last
/// recorded value was.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub progress: f64,
    pub finished: bool,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&JobSnapshot> for ProgressReport {
    fn from(snapshot: &JobSnapshot) -> Self {
        match snapshot.state {
            JobState::Done => Self {
                progress: 100.0,
                finished: true,
                state: JobState::Done,
                message: None,
            },
            JobState::Error => Self {
                progress: -1.0,
                finished: false,
                state: JobState::Error,
                message: Some(
                    snapshot
                        .message
                        .clone()
                        .unwrap_or_else(|| "Processing failed".to_string()),
                ),
            },
            state => Self {
                progress: snapshot.progress,
                finished: false,
                state,
                message: None,
            },
        }
    }
}
