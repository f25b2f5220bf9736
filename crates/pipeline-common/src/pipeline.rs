//! # Staged Pipeline Implementation
//!
//! This module provides the pipeline driver that applies a fixed, ordered list
//! of stages to one document.
//!
//! ## Usage
//!
//! Create a new `StagedPipeline<D>`, add stages implementing `Stage<D>`, then
//! call [`StagedPipeline::run`] with the document and a [`StageObserver`].
//! The observer is invoked after each stage with the stage's 1-based index and
//! the total stage count, so progress is `index / total` and reaches 1.0 as the
//! last stage completes, before `run` returns.
//!

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::{PipelineContext, PipelineError, Stage, StageCompletion, StageObserver};

/// A pipeline applying a sequence of stages to one document.
pub struct StagedPipeline<D> {
    stages: Vec<Box<dyn Stage<D>>>,
    context: Arc<PipelineContext>,
}

impl<D> StagedPipeline<D> {
    /// Create a new empty pipeline with the given context.
    pub fn new(context: Arc<PipelineContext>) -> Self {
        Self {
            stages: Vec::new(),
            context,
        }
    }

    /// Add a stage to the end of the pipeline.
    ///
    /// Returns self for method chaining.
    pub fn add_stage<S: Stage<D> + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in execution order.
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, notifying `observer` after each one.
    ///
    /// Cancellation is checked before each stage; a stage that is already
    /// running is never interrupted.
    pub fn run(
        mut self,
        mut document: D,
        observer: &dyn StageObserver,
    ) -> Result<D, PipelineError> {
        let total = self.stages.len();
        let run_started = Instant::now();

        for (position, stage) in self.stages.iter_mut().enumerate() {
            if self.context.token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let name = stage.name();
            let started = Instant::now();
            debug!(pipeline = %self.context.name, stage = name, "Running stage");

            stage
                .apply(&mut document)
                .map_err(|source| PipelineError::StageProcess {
                    stage: name,
                    source,
                })?;

            let completion = StageCompletion {
                index: position + 1,
                total,
                stage: name,
                elapsed: started.elapsed(),
            };
            debug!(
                pipeline = %self.context.name,
                stage = name,
                index = completion.index,
                total,
                elapsed_ms = completion.elapsed.as_millis() as u64,
                "Stage complete"
            );
            observer.on_stage_complete(&completion);
        }

        info!(
            pipeline = %self.context.name,
            stages = total,
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnStage, NoopObserver};
    use std::sync::Mutex;

    fn push(value: u32) -> FnStage<impl FnMut(&mut Vec<u32>) -> Result<(), crate::StageError>> {
        FnStage::new("push", move |doc: &mut Vec<u32>| {
            doc.push(value);
            Ok(())
        })
    }

    #[test]
    fn runs_stages_in_order() {
        let pipeline = StagedPipeline::new(Arc::new(PipelineContext::default()))
            .add_stage(push(1))
            .add_stage(push(2))
            .add_stage(push(3));

        assert_eq!(pipeline.len(), 3);
        let doc = pipeline.run(Vec::new(), &NoopObserver).unwrap();
        assert_eq!(doc, vec![1, 2, 3]);
    }

    #[test]
    fn observer_sees_monotonic_progress_ending_at_100() {
        let seen = Mutex::new(Vec::new());
        let observer = |c: &StageCompletion| seen.lock().unwrap().push(c.percent());

        StagedPipeline::new(Arc::new(PipelineContext::default()))
            .add_stage(push(1))
            .add_stage(push(2))
            .add_stage(push(3))
            .add_stage(push(4))
            .run(Vec::new(), &observer)
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert_eq!(seen, vec![25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn failing_stage_stops_the_run() {
        let calls = Mutex::new(0usize);
        let observer = |_: &StageCompletion| *calls.lock().unwrap() += 1;

        let result = StagedPipeline::new(Arc::new(PipelineContext::default()))
            .add_stage(push(1))
            .add_stage(FnStage::new("explode", |_: &mut Vec<u32>| {
                Err::<(), crate::StageError>("boom".into())
            }))
            .add_stage(push(3))
            .run(Vec::new(), &observer);

        match result {
            Err(PipelineError::StageProcess { stage, source }) => {
                assert_eq!(stage, "explode");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("expected stage error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn cancelled_context_runs_nothing() {
        let token = crate::CancellationToken::new();
        token.cancel();

        let result = StagedPipeline::new(Arc::new(PipelineContext::new(token)))
            .add_stage(push(1))
            .run(Vec::new(), &NoopObserver);

        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
