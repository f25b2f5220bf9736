//! Staged-pipeline progress source.

use std::sync::Arc;

use pipeline_common::{StageCompletion, StageObserver};
use tracing::debug;

use crate::jobs::JobEntry;

/// Reports `completed stages / total stages` into a job.
pub struct StagedProgress {
    entry: Arc<JobEntry>,
}

impl StagedProgress {
    pub fn new(entry: Arc<JobEntry>) -> Self {
        Self { entry }
    }
}

impl StageObserver for StagedProgress {
    fn on_stage_complete(&self, completion: &StageCompletion) {
        let percent = completion.percent();
        self.entry.set_progress(percent);
        debug!(
            job_id = %self.entry.id(),
            stage = completion.stage,
            step = completion.index,
            total = completion.total,
            progress = percent,
            "Stage complete"
        );
    }
}
