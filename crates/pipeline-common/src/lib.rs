//! # Pipeline Common
//!
//! This crate provides the abstractions for building staged, in-process asset
//! transform pipelines. A pipeline is a fixed, ordered list of named stages
//! applied to a single document; after every completed stage an observer is
//! notified synchronously, which is what progress reporting hooks into.
//!
//! ## Features
//!
//! - Generic `Stage<D>` trait for transforming any document type
//! - Generic `StagedPipeline<D>` driver that runs stages in order
//! - `StageObserver` callback invoked after each completed stage
//! - Common error type and cancellation-aware context
//!

use thiserror::Error;

mod context;
pub mod pipeline;
pub mod progress;
pub mod stage;

/// Re-export key traits and types
pub use context::PipelineContext;
pub use pipeline::StagedPipeline;
pub use progress::{NoopObserver, StageCompletion, StageObserver};
pub use stage::{FnStage, Stage, StageError};
pub use tokio_util::sync::CancellationToken;

/// Common error type for pipeline operations
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Stage process failed ({stage}): {source}")]
    StageProcess {
        stage: &'static str,
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// Name of the stage that failed, if the error came from a stage.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            PipelineError::StageProcess { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
