//! Process-wide job registry and single-flight admission gate.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::entry::{
    JobEntry, JobKind, JobPaths, JobSnapshot, JobState, ProgressReport, validate_job_id,
};
use crate::utils::fs::dir_exists;
use crate::{Error, Result};

/// Runs the conversion for an admitted job.
///
/// Returning `Ok` settles the job as DONE and `Err` as ERROR, unless the job
/// was already settled (for example by a log error marker).
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, entry: Arc<JobEntry>) -> Result<()>;
}

#[derive(Default)]
struct RegistryInner {
    jobs: HashMap<String, Arc<JobEntry>>,
    /// Every entry in registration order.
    order: Vec<Arc<JobEntry>>,
    /// The most recently admitted job. Admission is allowed once it is terminal.
    active: Option<Arc<JobEntry>>,
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub done: usize,
    pub error: usize,
}

/// Owns every job created during the process lifetime.
///
/// Entries are never removed. At most one entry is PROCESSING at any time;
/// the check and the QUEUED -> PROCESSING flip happen under the same lock.
pub struct JobRegistry {
    base_path: PathBuf,
    auto_advance: bool,
    runner: Arc<dyn JobRunner>,
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new(base_path: impl Into<PathBuf>, runner: Arc<dyn JobRunner>) -> Self {
        Self {
            base_path: base_path.into(),
            auto_advance: false,
            runner,
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Admit the oldest queued job whenever a job settles.
    pub fn with_auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = enabled;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Register a job, or return the existing one for this id, and try to start it.
    ///
    /// Fails with [`Error::NotFound`] if the input directory does not exist.
    pub async fn register(self: &Arc<Self>, id: &str, kind: JobKind) -> Result<Arc<JobEntry>> {
        validate_job_id(id)?;

        let input_dir = JobPaths::input_dir_for(&self.base_path, kind, id);
        if !dir_exists(&input_dir).await {
            debug!(job_id = %id, kind = %kind, dir = %input_dir.display(), "Input directory missing");
            return Err(Error::not_found(format!("{kind} input directory"), id));
        }

        let (entry, created) = {
            let mut inner = self.inner.lock();
            match inner.jobs.get(id) {
                Some(existing) => (Arc::clone(existing), false),
                None => {
                    let entry = Arc::new(JobEntry::new(id, kind, &self.base_path));
                    inner.jobs.insert(id.to_string(), Arc::clone(&entry));
                    inner.order.push(Arc::clone(&entry));
                    (entry, true)
                }
            }
        };

        if created {
            info!(job_id = %id, kind = %kind, "Job registered");
        } else if entry.kind() != kind {
            warn!(
                job_id = %id,
                requested = %kind,
                existing = %entry.kind(),
                "Job id already registered with a different type"
            );
        }

        self.start(&entry);
        Ok(entry)
    }

    /// Try to move `entry` to PROCESSING and spawn its conversion.
    ///
    /// Returns false if the entry is not QUEUED or another job is running.
    pub fn start(self: &Arc<Self>, entry: &Arc<JobEntry>) -> bool {
        {
            let mut inner = self.inner.lock();
            let busy = inner
                .active
                .as_ref()
                .is_some_and(|active| !active.state().is_terminal());
            if busy || !entry.begin_processing() {
                return false;
            }
            inner.active = Some(Arc::clone(entry));
        }

        info!(job_id = %entry.id(), kind = %entry.kind(), "Processing started");
        let registry = Arc::clone(self);
        let entry = Arc::clone(entry);
        tokio::spawn(async move { registry.drive(entry).await });
        true
    }

    async fn drive(self: Arc<Self>, entry: Arc<JobEntry>) {
        let runner = Arc::clone(&self.runner);
        let task_entry = Arc::clone(&entry);
        // A separate task turns a panicking handler into a JoinError.
        let outcome = tokio::spawn(async move { runner.run(task_entry).await }).await;

        match outcome {
            Ok(Ok(())) => {
                if entry.complete() {
                    info!(job_id = %entry.id(), kind = %entry.kind(), "Processing finished");
                } else {
                    debug!(job_id = %entry.id(), state = %entry.state(), "Job already settled");
                }
            }
            Ok(Err(e)) => {
                error!(job_id = %entry.id(), kind = %entry.kind(), error = %e, "Processing failed");
                entry.fail(e.to_string());
            }
            Err(e) => {
                error!(job_id = %entry.id(), kind = %entry.kind(), error = %e, "Handler task aborted");
                entry.fail(format!("Handler task aborted: {e}"));
            }
        }

        {
            let mut inner = self.inner.lock();
            if inner.active.as_ref().is_some_and(|a| Arc::ptr_eq(a, &entry)) {
                inner.active = None;
            }
        }

        if self.auto_advance {
            self.admit_next();
        }
    }

    /// Start the oldest queued job, if any.
    pub fn admit_next(self: &Arc<Self>) -> bool {
        let next = {
            let inner = self.inner.lock();
            inner
                .order
                .iter()
                .find(|e| e.state() == JobState::Queued)
                .cloned()
        };
        match next {
            Some(entry) => self.start(&entry),
            None => false,
        }
    }

    /// Progress for `id`. A queued job gets another admission attempt first.
    pub fn progress(self: &Arc<Self>, id: &str) -> Result<ProgressReport> {
        let entry = self.get(id).ok_or_else(|| Error::not_found("Job", id))?;
        if entry.state() == JobState::Queued {
            self.start(&entry);
        }
        Ok(entry.report())
    }

    pub fn get(&self, id: &str) -> Option<Arc<JobEntry>> {
        self.inner.lock().jobs.get(id).cloned()
    }

    /// Queued and processing jobs, oldest first.
    pub fn queue(&self) -> Vec<JobSnapshot> {
        self.snapshot()
            .into_iter()
            .filter(|s| matches!(s.state, JobState::Queued | JobState::Processing))
            .collect()
    }

    /// Every job, in registration order.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let inner = self.inner.lock();
        inner.order.iter().map(|e| e.snapshot()).collect()
    }

    pub fn stats(&self) -> JobStats {
        self.snapshot()
            .iter()
            .fold(JobStats::default(), |mut stats, job| {
                stats.total += 1;
                match job.state {
                    JobState::Queued => stats.queued += 1,
                    JobState::Processing => stats.processing += 1,
                    JobState::Done => stats.done += 1,
                    JobState::Error => stats.error += 1,
                }
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Runner that blocks each job until released, then succeeds or fails by id.
    #[derive(Default)]
    struct GatedRunner {
        release: Notify,
    }

    #[async_trait]
    impl JobRunner for GatedRunner {
        async fn run(&self, entry: Arc<JobEntry>) -> Result<()> {
            self.release.notified().await;
            match entry.id() {
                id if id.starts_with("fail") => Err(Error::Other("boom".into())),
                id if id.starts_with("panic") => panic!("handler panicked"),
                _ => Ok(()),
            }
        }
    }

    fn upload_dir(base: &TempDir, kind: JobKind, id: &str) {
        std::fs::create_dir_all(base.path().join(kind.as_str()).join(id)).unwrap();
    }

    fn registry(base: &TempDir) -> (Arc<JobRegistry>, Arc<GatedRunner>) {
        let runner = Arc::new(GatedRunner::default());
        let registry = Arc::new(JobRegistry::new(base.path(), runner.clone()));
        (registry, runner)
    }

    async fn wait_for(entry: &JobEntry, state: JobState) {
        for _ in 0..200 {
            if entry.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached {state}, still {}", entry.id(), entry.state());
    }

    #[tokio::test]
    async fn register_requires_input_directory() {
        let base = TempDir::new().unwrap();
        let (registry, _) = registry(&base);

        let err = registry.register("missing", JobKind::Cloud).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(registry.get("missing").is_none());

        upload_dir(&base, JobKind::Model, "present");
        let err = registry.register("present", JobKind::Cloud).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert!(registry.register("present", JobKind::Model).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_ids_are_rejected_before_touching_disk() {
        let base = TempDir::new().unwrap();
        let (registry, _) = registry(&base);
        let err = registry.register("../model", JobKind::Cloud).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn only_one_job_processes_at_a_time() {
        let base = TempDir::new().unwrap();
        let (registry, runner) = registry(&base);
        upload_dir(&base, JobKind::Cloud, "a");
        upload_dir(&base, JobKind::Cloud, "b");

        let a = registry.register("a", JobKind::Cloud).await.unwrap();
        let b = registry.register("b", JobKind::Cloud).await.unwrap();
        assert_eq!(a.state(), JobState::Processing);
        assert_eq!(b.state(), JobState::Queued);
        assert_eq!(registry.stats().processing, 1);

        // Polling a blocked job leaves it queued.
        let report = registry.progress("b").unwrap();
        assert_eq!(report.state, JobState::Queued);

        runner.release.notify_one();
        wait_for(&a, JobState::Done).await;

        // Without auto-advance the next job waits for a poll.
        assert_eq!(b.state(), JobState::Queued);
        let report = registry.progress("b").unwrap();
        assert_eq!(report.state, JobState::Processing);

        runner.release.notify_one();
        wait_for(&b, JobState::Done).await;
    }

    #[tokio::test]
    async fn reregistering_returns_existing_entry() {
        let base = TempDir::new().unwrap();
        let (registry, runner) = registry(&base);
        upload_dir(&base, JobKind::Splat, "s");

        let first = registry.register("s", JobKind::Splat).await.unwrap();
        let second = registry.register("s", JobKind::Splat).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.snapshot().len(), 1);

        runner.release.notify_one();
        wait_for(&first, JobState::Done).await;
        let again = registry.register("s", JobKind::Splat).await.unwrap();
        assert_eq!(again.state(), JobState::Done);
    }

    #[tokio::test]
    async fn handler_errors_and_panics_become_error_state() {
        let base = TempDir::new().unwrap();
        let (registry, runner) = registry(&base);
        upload_dir(&base, JobKind::Ifc, "fail-1");
        upload_dir(&base, JobKind::Ifc, "panic-1");

        let failed = registry.register("fail-1", JobKind::Ifc).await.unwrap();
        runner.release.notify_one();
        wait_for(&failed, JobState::Error).await;
        assert_eq!(failed.message().as_deref(), Some("boom"));

        let panicked = registry.register("panic-1", JobKind::Ifc).await.unwrap();
        assert_eq!(panicked.state(), JobState::Processing);
        runner.release.notify_one();
        wait_for(&panicked, JobState::Error).await;
        assert!(panicked.message().unwrap().contains("panicked"));

        let report = registry.progress("panic-1").unwrap();
        assert_eq!(report.progress, -1.0);
    }

    #[tokio::test]
    async fn auto_advance_admits_oldest_queued() {
        let base = TempDir::new().unwrap();
        let runner = Arc::new(GatedRunner::default());
        let registry =
            Arc::new(JobRegistry::new(base.path(), runner.clone()).with_auto_advance(true));
        for id in ["first", "second", "third"] {
            upload_dir(&base, JobKind::Model, id);
        }

        let first = registry.register("first", JobKind::Model).await.unwrap();
        let second = registry.register("second", JobKind::Model).await.unwrap();
        let third = registry.register("third", JobKind::Model).await.unwrap();

        runner.release.notify_one();
        wait_for(&second, JobState::Processing).await;
        assert_eq!(first.state(), JobState::Done);
        assert_eq!(third.state(), JobState::Queued);

        let queue = registry.queue();
        let ids: Vec<_> = queue.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn progress_of_unknown_job_is_not_found() {
        let base = TempDir::new().unwrap();
        let (registry, _) = registry(&base);
        assert!(matches!(registry.progress("nope"), Err(Error::NotFound { .. })));
    }

    /// Finishes every job after yielding once, so admissions race with settles.
    struct YieldingRunner;

    #[async_trait]
    impl JobRunner for YieldingRunner {
        async fn run(&self, _entry: Arc<JobEntry>) -> Result<()> {
            tokio::task::yield_now().await;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_registrations_never_run_two_jobs() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const JOBS: usize = 64;
        let base = TempDir::new().unwrap();
        let ids: Vec<String> = (0..JOBS).map(|i| format!("job-{i}")).collect();
        for id in &ids {
            upload_dir(&base, JobKind::Model, id);
        }
        let registry = Arc::new(
            JobRegistry::new(base.path(), Arc::new(YieldingRunner)).with_auto_advance(true),
        );

        let stop = Arc::new(AtomicBool::new(false));
        let sampler = {
            let registry = Arc::clone(&registry);
            let stop = Arc::clone(&stop);
            tokio::spawn(async move {
                let mut max_processing = 0;
                while !stop.load(Ordering::SeqCst) {
                    max_processing = max_processing.max(registry.stats().processing);
                    tokio::task::yield_now().await;
                }
                max_processing
            })
        };

        let registrations: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.register(&id, JobKind::Model).await.unwrap();
                    registry.progress(&id).unwrap();
                })
            })
            .collect();
        for registration in registrations {
            registration.await.unwrap();
        }

        for _ in 0..1000 {
            if registry.stats().done == JOBS {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.store(true, Ordering::SeqCst);

        assert!(sampler.await.unwrap() <= 1);
        let stats = registry.stats();
        assert_eq!(stats.total, JOBS);
        assert_eq!(stats.done, JOBS);
    }
}
