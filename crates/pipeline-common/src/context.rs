//! Pipeline run context
//!
//! Shared context for a single pipeline run: a human-readable name used in
//! log output and the cancellation token checked between stages.

use tokio_util::sync::CancellationToken;

/// Shared context for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Name of the document/job being processed
    pub name: String,
    /// The cancellation token
    pub token: CancellationToken,
}

impl PipelineContext {
    /// Create a new context with a default name.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            name: "pipeline".to_string(),
            token,
        }
    }

    pub fn with_name(name: impl Into<String>, token: CancellationToken) -> Self {
        Self {
            name: name.into(),
            ..Self::new(token)
        }
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
