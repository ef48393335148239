//! Job control register.
//!
//! Owns the lifecycle of persisted jobs: exclusive start per category,
//! heartbeats, stop requests, progress, exactly-once finalization and zombie
//! reaping. Every read path reaps jobs whose heartbeat has gone stale past
//! the zombie threshold, so operators and workers share one liveness rule.
//!
//! Stop requests travel two ways: through the persisted `stop_requested`
//! flag, which workers check at their checkpoints, and through a per-job
//! cancellation token that aborts in-flight provider calls.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Job, JobKind, JobMeta, JobStatus, JobsConfig, ProgressPatch};
use crate::domain::ports::{JobFilter, JobRepository};

/// How recently a job was heard from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobLiveness {
    /// Heard from recently
    Live,
    /// Quiet longer than expected; probably slow
    Stale,
    /// Quiet past the reap threshold; treated as dead
    Zombie,
}

/// Staleness thresholds shared by workers and pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    /// Quiet time after which a job is reported stale
    pub stale_after: Duration,
    /// Quiet time after which a job is reaped
    pub zombie_after: Duration,
}

impl LivenessPolicy {
    /// Thresholds from the jobs config
    pub const fn from_config(config: &JobsConfig) -> Self {
        Self {
            stale_after: Duration::from_secs(config.stale_after_secs),
            zombie_after: Duration::from_secs(config.zombie_after_secs),
        }
    }

    /// Terminal jobs are always `Live`.
    pub fn classify(&self, job: &Job, now: DateTime<Utc>) -> JobLiveness {
        if job.status.is_terminal() {
            return JobLiveness::Live;
        }
        let idle = job.idle_for(now).to_std().unwrap_or_default();
        if idle > self.zombie_after {
            JobLiveness::Zombie
        } else if idle > self.stale_after {
            JobLiveness::Stale
        } else {
            JobLiveness::Live
        }
    }
}

/// Raised at worker checkpoints.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job was stop-requested
    #[error("job {0} was stopped")]
    Stopped(Uuid),

    /// The job was finalized elsewhere
    #[error("job {job_id} was already finalized as {status}")]
    Finalized {
        /// Job that was finalized
        job_id: Uuid,
        /// Status it was finalized with
        status: JobStatus,
    },

    /// Job register failure
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Handle passed to the work running under a job.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Id of the running job
    pub job_id: Uuid,
    /// Fires when the job is stop-requested
    pub cancel: CancellationToken,
}

/// How a finished operation should finalize its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobExit {
    /// Finish as COMPLETED with this message
    Completed(String),
    /// Finish as FAILED with this reason
    Failed(String),
}

/// Implemented by operation results to pick the terminal job status.
pub trait JobOutcome {
    /// Terminal status and message for this result
    fn job_exit(&self) -> JobExit;
}

/// Implemented by operation errors; stop errors finalize as STOPPED.
pub trait JobFailure: fmt::Display {
    /// Whether the error means the job was stopped
    fn is_stop(&self) -> bool;
}

/// Error from `JobControl::run_job`.
#[derive(Debug, Error)]
pub enum JobRunError<E> {
    /// The job could not be registered
    #[error("could not start job: {0}")]
    Start(DomainError),

    /// The work returned an error
    #[error("job {job_id} failed: {error}")]
    Failed {
        /// Job the work ran under
        job_id: Uuid,
        /// Error the work returned
        error: E,
    },

    /// The work panicked
    #[error("job {job_id} panicked: {message}")]
    Panicked {
        /// Job the work ran under
        job_id: Uuid,
        /// Panic payload, when it was a string
        message: String,
    },
}

type TokenRegistry = Arc<Mutex<HashMap<Uuid, CancellationToken>>>;

/// Background heartbeat for one job.
pub struct HeartbeatHandle {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeartbeatHandle {
    /// Stop the heartbeat and wait for the loop to exit.
    pub async fn stop(mut self) {
        self.stop.cancel();
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "heartbeat task ended abnormally");
        }
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Finalizes the job as FAILED if the running operation is dropped before
/// `run_job` could finalize it.
struct FinalizeGuard {
    repo: Arc<dyn JobRepository>,
    tokens: TokenRegistry,
    job_id: Uuid,
    armed: bool,
}

impl FinalizeGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let (repo, tokens, job_id) = (self.repo.clone(), self.tokens.clone(), self.job_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let message = "operation aborted before completion".to_string();
                    if let Err(e) = finalize(&*repo, &tokens, job_id, JobStatus::Failed, Some(message)).await {
                        error!(%job_id, error = %e, "failed to finalize aborted job");
                    }
                });
            }
            Err(_) => warn!(%job_id, "no runtime to finalize aborted job; it will be reaped"),
        }
    }
}

/// Apply a terminal status once. Returns false if the job was already terminal.
async fn finalize(
    repo: &dyn JobRepository,
    tokens: &TokenRegistry,
    job_id: Uuid,
    status: JobStatus,
    message: Option<String>,
) -> DomainResult<bool> {
    if !status.is_terminal() {
        return Err(DomainError::InvalidStateTransition {
            from: "active".to_string(),
            to: status.as_str().to_string(),
            reason: "jobs can only be finished with a terminal status".to_string(),
        });
    }
    let mut job = repo.get(job_id).await?.ok_or(DomainError::JobNotFound(job_id))?;
    if job.status.is_terminal() {
        debug!(%job_id, status = %job.status, "job already finalized");
        return Ok(false);
    }

    job.transition_to(status, Utc::now())?;
    if status == JobStatus::Failed {
        job.error.clone_from(&message);
    }
    if message.is_some() {
        job.message = message;
    }
    repo.update(&job).await?;

    if let Some(token) = tokens.lock().unwrap_or_else(PoisonError::into_inner).remove(&job_id) {
        token.cancel();
    }
    info!(%job_id, category_id = %job.category_id, status = %status, "job finalized");
    Ok(true)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// The job register service.
pub struct JobControl {
    repo: Arc<dyn JobRepository>,
    policy: LivenessPolicy,
    heartbeat_interval: Duration,
    tokens: TokenRegistry,
}

impl JobControl {
    /// Job control over `repo` with the configured liveness thresholds
    pub fn new(repo: Arc<dyn JobRepository>, config: &JobsConfig) -> Self {
        Self {
            repo,
            policy: LivenessPolicy::from_config(config),
            heartbeat_interval: config.heartbeat_interval(),
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Liveness thresholds in use
    pub const fn policy(&self) -> &LivenessPolicy {
        &self.policy
    }

    /// Classify a job by how long it has been quiet
    pub fn liveness(&self, job: &Job) -> JobLiveness {
        self.policy.classify(job, Utc::now())
    }

    /// Cancellation token for a job, created on first use.
    pub fn cancellation_token(&self, job_id: Uuid) -> CancellationToken {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(job_id)
            .or_default()
            .clone()
    }

    /// Record and start a job. Fails if the category already has a live one.
    pub async fn start_job(&self, kind: JobKind, category_id: &str, meta: JobMeta) -> DomainResult<Job> {
        if let Some(active) = self.get_active_job_for_category(category_id).await? {
            return Err(DomainError::ActiveJobExists {
                category_id: category_id.to_string(),
                job_id: active.id,
            });
        }

        let mut job = Job::new(kind, category_id, meta, Utc::now());
        self.repo.create_exclusive(&job).await?;
        job.transition_to(JobStatus::Running, Utc::now())?;
        self.repo.update(&job).await?;
        self.cancellation_token(job.id);

        info!(job_id = %job.id, category_id, kind = %kind, "job started");
        Ok(job)
    }

    /// Ask a job to stop. Terminal jobs are returned unchanged.
    pub async fn request_stop(&self, job_id: Uuid) -> DomainResult<Job> {
        let mut job = self.get_job(job_id).await?.ok_or(DomainError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        job.stop_requested = true;
        if job.status != JobStatus::StopRequested {
            job.transition_to(JobStatus::StopRequested, Utc::now())?;
        }
        self.repo.update(&job).await?;

        if let Some(token) = self.tokens.lock().unwrap_or_else(PoisonError::into_inner).get(&job_id) {
            token.cancel();
        }
        info!(%job_id, category_id = %job.category_id, "stop requested");
        Ok(job)
    }

    /// Apply a progress patch. Ignored once the job is terminal.
    pub async fn update_progress(&self, job_id: Uuid, patch: ProgressPatch) -> DomainResult<()> {
        let mut job = self.repo.get(job_id).await?.ok_or(DomainError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            debug!(%job_id, "ignoring progress on terminal job");
            return Ok(());
        }
        job.apply_progress(patch, Utc::now());
        self.repo
            .record_progress(job_id, job.progress, job.message.as_deref(), job.updated_at)
            .await?;
        Ok(())
    }

    /// Record which snapshot a running job works on.
    pub async fn attach_snapshot(&self, job_id: Uuid, snapshot_id: &str) -> DomainResult<()> {
        if !self.repo.attach_snapshot(job_id, snapshot_id).await? {
            debug!(%job_id, snapshot_id, "job is terminal; snapshot not attached");
        }
        Ok(())
    }

    /// Refresh `updated_at`. Returns false once the job is terminal or gone.
    pub async fn heartbeat(&self, job_id: Uuid) -> DomainResult<bool> {
        self.repo.touch(job_id, Utc::now()).await
    }

    /// Finalize a job exactly once. Returns false if it was already terminal.
    pub async fn finish_job(&self, job_id: Uuid, status: JobStatus, message: Option<String>) -> DomainResult<bool> {
        finalize(&*self.repo, &self.tokens, job_id, status, message).await
    }

    /// Fetch a job, reaping it first if it is a zombie.
    pub async fn get_job(&self, job_id: Uuid) -> DomainResult<Option<Job>> {
        match self.repo.get(job_id).await? {
            Some(job) => Ok(Some(self.reap_if_zombie(job).await?)),
            None => Ok(None),
        }
    }

    /// The live job for a category. Zombies are reaped and not returned.
    pub async fn get_active_job_for_category(&self, category_id: &str) -> DomainResult<Option<Job>> {
        let Some(job) = self.repo.find_active_for_category(category_id).await? else {
            return Ok(None);
        };
        let job = self.reap_if_zombie(job).await?;
        Ok(job.status.is_active().then_some(job))
    }

    /// List jobs matching `filter`, reaping zombies first
    pub async fn list_jobs(&self, filter: JobFilter) -> DomainResult<Vec<Job>> {
        let jobs = self.repo.list(filter).await?;
        let mut reaped = Vec::with_capacity(jobs.len());
        for job in jobs {
            reaped.push(self.reap_if_zombie(job).await?);
        }
        Ok(reaped)
    }

    async fn reap_if_zombie(&self, mut job: Job) -> DomainResult<Job> {
        let now = Utc::now();
        if self.policy.classify(&job, now) != JobLiveness::Zombie {
            return Ok(job);
        }

        let idle = job.idle_for(now).num_seconds();
        let target = if job.status == JobStatus::StopRequested {
            JobStatus::Stopped
        } else {
            JobStatus::Failed
        };
        let message = format!("zombie reaped: no heartbeat for {idle}s");
        job.transition_to(target, now)?;
        if target == JobStatus::Failed {
            job.error = Some(message.clone());
        }
        job.message = Some(message);
        self.repo.update(&job).await?;

        if let Some(token) = self.tokens.lock().unwrap_or_else(PoisonError::into_inner).remove(&job.id) {
            token.cancel();
        }
        warn!(job_id = %job.id, category_id = %job.category_id, idle_secs = idle, status = %target, "zombie job reaped");
        Ok(job)
    }

    /// Checkpoint for workers: errors once the job was stopped or finalized.
    pub async fn assert_not_stopped(&self, job_id: Uuid) -> Result<(), JobError> {
        let token = self.cancellation_token(job_id);
        let job = self.repo.get(job_id).await?.ok_or(DomainError::JobNotFound(job_id))?;

        if token.is_cancelled()
            || job.stop_requested
            || matches!(job.status, JobStatus::StopRequested | JobStatus::Stopped)
        {
            token.cancel();
            return Err(JobError::Stopped(job_id));
        }
        if job.status.is_terminal() {
            token.cancel();
            return Err(JobError::Finalized {
                job_id,
                status: job.status,
            });
        }
        Ok(())
    }

    /// Heartbeat a job on an interval until the handle is stopped or dropped.
    ///
    /// The loop also watches for stop requests written by other processes and
    /// fires the job's token when it sees one.
    pub fn spawn_heartbeat(&self, job_id: Uuid) -> HeartbeatHandle {
        let stop = CancellationToken::new();
        let job_token = self.cancellation_token(job_id);
        let repo = self.repo.clone();
        let period = self.heartbeat_interval;
        let loop_stop = stop.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = loop_stop.cancelled() => break,
                    _ = ticker.tick() => {
                        match repo.touch(job_id, Utc::now()).await {
                            Ok(true) => {}
                            Ok(false) => break,
                            Err(e) => {
                                warn!(%job_id, error = %e, "heartbeat write failed");
                                continue;
                            }
                        }
                        if let Ok(Some(job)) = repo.get(job_id).await {
                            if job.stop_requested && !job_token.is_cancelled() {
                                info!(%job_id, "stop request observed by heartbeat");
                                job_token.cancel();
                            }
                        }
                    }
                }
            }
            debug!(%job_id, "heartbeat stopped");
        });

        HeartbeatHandle { stop, handle }
    }

    /// Run `work` under a new job and finalize the job on every exit path.
    ///
    /// Success finalizes per `JobOutcome`; errors finalize as STOPPED for stop
    /// errors and FAILED otherwise; panics finalize as FAILED. If the returned
    /// future is dropped mid-flight the job is finalized as FAILED in the
    /// background.
    pub async fn run_job<T, E, F, Fut>(
        &self,
        kind: JobKind,
        category_id: &str,
        meta: JobMeta,
        work: F,
    ) -> Result<T, JobRunError<E>>
    where
        F: FnOnce(JobContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: JobOutcome,
        E: JobFailure,
    {
        let job = self
            .start_job(kind, category_id, meta)
            .await
            .map_err(JobRunError::Start)?;
        let job_id = job.id;
        let mut guard = FinalizeGuard {
            repo: self.repo.clone(),
            tokens: self.tokens.clone(),
            job_id,
            armed: true,
        };
        let ctx = JobContext {
            job_id,
            cancel: self.cancellation_token(job_id),
        };

        let heartbeat = self.spawn_heartbeat(job_id);
        let outcome = AssertUnwindSafe(work(ctx)).catch_unwind().await;
        heartbeat.stop().await;

        let (status, message, result) = match outcome {
            Ok(Ok(value)) => match value.job_exit() {
                JobExit::Completed(message) => (JobStatus::Completed, message, Ok(value)),
                JobExit::Failed(message) => (JobStatus::Failed, message, Ok(value)),
            },
            Ok(Err(err)) => {
                let status = if err.is_stop() {
                    JobStatus::Stopped
                } else {
                    JobStatus::Failed
                };
                (status, err.to_string(), Err(JobRunError::Failed { job_id, error: err }))
            }
            Err(payload) => {
                let message = panic_message(&*payload);
                error!(%job_id, panic = %message, "job panicked");
                (
                    JobStatus::Failed,
                    format!("panicked: {message}"),
                    Err(JobRunError::Panicked { job_id, message }),
                )
            }
        };

        guard.disarm();
        if let Err(e) = self.finish_job(job_id, status, Some(message)).await {
            error!(%job_id, error = %e, "failed to finalize job; it will be reaped");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryJobRepository;

    fn control() -> (Arc<InMemoryJobRepository>, JobControl) {
        let repo = Arc::new(InMemoryJobRepository::new());
        let control = JobControl::new(repo.clone(), &JobsConfig::default());
        (repo, control)
    }

    #[derive(Debug)]
    struct Done;

    impl JobOutcome for Done {
        fn job_exit(&self) -> JobExit {
            JobExit::Completed("done".to_string())
        }
    }

    #[derive(Debug)]
    enum Boom {
        Stop,
        Broken,
    }

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Stop => f.write_str("stopped"),
                Self::Broken => f.write_str("broken pipe"),
            }
        }
    }

    impl JobFailure for Boom {
        fn is_stop(&self) -> bool {
            matches!(self, Self::Stop)
        }
    }

    #[test]
    fn test_liveness_policy_thresholds() {
        let policy = LivenessPolicy::from_config(&JobsConfig::default());
        let now = Utc::now();
        let mut job = Job::new(JobKind::Grow, "shaving", JobMeta::default(), now);
        job.status = JobStatus::Running;
        assert_eq!(policy.classify(&job, now), JobLiveness::Live);
        job.updated_at = now - chrono::Duration::seconds(90);
        assert_eq!(policy.classify(&job, now), JobLiveness::Stale);
        job.updated_at = now - chrono::Duration::seconds(181);
        assert_eq!(policy.classify(&job, now), JobLiveness::Zombie);
        job.status = JobStatus::Completed;
        assert_eq!(policy.classify(&job, now), JobLiveness::Live);
    }

    #[tokio::test]
    async fn test_one_active_job_per_category() {
        let (_, control) = control();
        let first = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        assert_eq!(first.status, JobStatus::Running);

        let err = control
            .start_job(JobKind::Certify, "shaving", JobMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::ActiveJobExists { job_id, .. } if job_id == first.id));

        control.start_job(JobKind::Grow, "oral-care", JobMeta::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_finish_job_is_exactly_once() {
        let (_, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        assert!(control.finish_job(job.id, JobStatus::Completed, None).await.unwrap());
        assert!(!control.finish_job(job.id, JobStatus::Failed, Some("late".into())).await.unwrap());
        let stored = control.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert!(stored.error.is_none());
    }

    #[tokio::test]
    async fn test_finish_job_rejects_non_terminal_status() {
        let (_, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        assert!(control.finish_job(job.id, JobStatus::Running, None).await.is_err());
    }

    #[tokio::test]
    async fn test_stop_request_trips_checkpoint_and_token() {
        let (_, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        let token = control.cancellation_token(job.id);
        control.assert_not_stopped(job.id).await.unwrap();

        let stopped = control.request_stop(job.id).await.unwrap();
        assert!(stopped.stop_requested);
        assert_eq!(stopped.status, JobStatus::StopRequested);
        assert!(token.is_cancelled());
        assert!(matches!(control.assert_not_stopped(job.id).await, Err(JobError::Stopped(_))));
    }

    #[tokio::test]
    async fn test_progress_ignored_after_finish() {
        let (_, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        control
            .update_progress(job.id, ProgressPatch::message("pass 1").counts(1, 12))
            .await
            .unwrap();
        control.finish_job(job.id, JobStatus::Completed, Some("ok".into())).await.unwrap();
        control
            .update_progress(job.id, ProgressPatch::message("pass 2").counts(2, 12))
            .await
            .unwrap();
        let stored = control.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.progress.processed, 1);
        assert_eq!(stored.message.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_zombie_is_reaped_by_reader() {
        let (repo, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        let mut stale = repo.get(job.id).await.unwrap().unwrap();
        stale.updated_at = Utc::now() - chrono::Duration::seconds(200);
        repo.update(&stale).await.unwrap();

        assert!(control.get_active_job_for_category("shaving").await.unwrap().is_none());
        let reaped = control.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(reaped.status, JobStatus::Failed);
        assert!(reaped.error.unwrap().contains("zombie reaped"));

        control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
    }

    #[tokio::test]
    async fn test_run_job_finalizes_each_exit() {
        let (_, control) = control();

        control
            .run_job(JobKind::Grow, "a", JobMeta::default(), |_| async { Ok::<_, Boom>(Done) })
            .await
            .unwrap();
        let err = control
            .run_job(JobKind::Grow, "b", JobMeta::default(), |_| async { Err::<Done, _>(Boom::Stop) })
            .await
            .unwrap_err();
        assert!(matches!(err, JobRunError::Failed { error: Boom::Stop, .. }));
        control
            .run_job(JobKind::Grow, "c", JobMeta::default(), |_| async { Err::<Done, _>(Boom::Broken) })
            .await
            .unwrap_err();

        let jobs = control.list_jobs(JobFilter::default()).await.unwrap();
        let status_of = |cat: &str| jobs.iter().find(|j| j.category_id == cat).unwrap().status;
        assert_eq!(status_of("a"), JobStatus::Completed);
        assert_eq!(status_of("b"), JobStatus::Stopped);
        assert_eq!(status_of("c"), JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_run_job_finalizes_after_panic() {
        let (_, control) = control();
        let err = control
            .run_job(JobKind::Certify, "shaving", JobMeta::default(), |_| async {
                if true {
                    panic!("gate table corrupted");
                }
                Ok::<_, Boom>(Done)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, JobRunError::Panicked { ref message, .. } if message.contains("corrupted")));

        let jobs = control.list_jobs(JobFilter::default()).await.unwrap();
        assert_eq!(jobs[0].status, JobStatus::Failed);
        assert!(control.get_active_job_for_category("shaving").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_keeps_job_fresh() {
        let (repo, control) = control();
        let job = control.start_job(JobKind::Grow, "shaving", JobMeta::default()).await.unwrap();
        let before = repo.get(job.id).await.unwrap().unwrap().updated_at;

        let heartbeat = control.spawn_heartbeat(job.id);
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        heartbeat.stop().await;

        let after = repo.get(job.id).await.unwrap().unwrap().updated_at;
        assert!(after >= before);
        assert!(repo.touch_count(job.id) >= 1);
    }
}
