//! Job model, state machine and registry.

mod entry;
mod registry;

pub use entry::{
    JobEntry, JobKind, JobPaths, JobSnapshot, JobState, MAX_JOB_ID_LEN, ProgressReport,
    validate_job_id,
};
pub use registry::{JobRegistry, JobRunner, JobStats};
