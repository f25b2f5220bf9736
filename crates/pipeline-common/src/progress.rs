//! Stage completion events and observers.

use std::time::Duration;

/// Emitted after a stage finished successfully.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageCompletion {
    /// 1-based position of the completed stage.
    pub index: usize,
    /// Number of stages in the pipeline.
    pub total: usize,
    /// Name of the completed stage.
    pub stage: &'static str,
    /// Wall time spent in the stage.
    pub elapsed: Duration,
}

impl StageCompletion {
    /// Fraction of the pipeline completed, in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.index as f64 / self.total as f64
    }

    /// Percentage completed, rounded to two decimals.
    pub fn percent(&self) -> f64 {
        (self.fraction() * 100.0 * 100.0).round() / 100.0
    }
}

/// Receives a callback after every completed stage.
///
/// Called synchronously on the thread running the pipeline, before the next
/// stage starts.
pub trait StageObserver: Send + Sync {
    fn on_stage_complete(&self, completion: &StageCompletion);
}

impl<F> StageObserver for F
where
    F: Fn(&StageCompletion) + Send + Sync,
{
    fn on_stage_complete(&self, completion: &StageCompletion) {
        self(completion)
    }
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {
    fn on_stage_complete(&self, _completion: &StageCompletion) {}
}
