//! Conversion dispatch.
//!
//! Every handler follows the same contract: locate exactly one input file,
//! create the output directory, run the conversion with its progress source
//! bound, then resolve or fail.

pub mod input;
pub mod mesh;
pub mod point_cloud;
pub mod splat;
pub mod structural;
mod tool;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::Result;
use crate::config::ServiceConfig;
use crate::jobs::{JobEntry, JobKind, JobRunner};

pub use input::locate_single_input;

/// Routes admitted jobs to the handler for their kind.
pub struct Dispatcher {
    config: Arc<ServiceConfig>,
    shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: Arc<ServiceConfig>, shutdown: CancellationToken) -> Self {
        Self { config, shutdown }
    }

    pub async fn dispatch(&self, entry: &Arc<JobEntry>) -> Result<()> {
        debug!(job_id = %entry.id(), kind = %entry.kind(), "Dispatching job");
        match entry.kind() {
            JobKind::Cloud => point_cloud::run(&self.config, entry).await,
            JobKind::Model => mesh::run(entry, self.shutdown.child_token()).await,
            JobKind::Splat => splat::run(&self.config, entry).await,
            JobKind::Ifc => structural::run(entry).await,
        }
    }
}

#[async_trait]
impl JobRunner for Dispatcher {
    async fn run(&self, entry: Arc<JobEntry>) -> Result<()> {
        self.dispatch(&entry).await
    }
}
