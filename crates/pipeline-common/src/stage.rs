//! # Stage trait
//!
//! A stage is one discrete, named transformation applied to a document in
//! place. Stages run strictly in sequence; a failing stage aborts the run.

/// Boxed error returned by a stage.
pub type StageError = Box<dyn std::error::Error + Send + Sync>;

/// A single step of a staged pipeline.
pub trait Stage<D>: Send {
    /// Stable stage name used in logs, errors and progress events.
    fn name(&self) -> &'static str;

    /// Apply the stage to the document.
    fn apply(&mut self, document: &mut D) -> Result<(), StageError>;
}

/// A stage backed by a closure.
pub struct FnStage<F> {
    name: &'static str,
    func: F,
}

impl<F> FnStage<F> {
    pub fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<D, F> Stage<D> for FnStage<F>
where
    F: FnMut(&mut D) -> Result<(), StageError> + Send,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&mut self, document: &mut D) -> Result<(), StageError> {
        (self.func)(document)
    }
}
