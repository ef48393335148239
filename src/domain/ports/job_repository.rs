use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Job, JobKind, JobProgress, JobStatus};

/// Filters for listing jobs
#[derive(Default, Debug, Clone)]
pub struct JobFilter {
    /// Only jobs for this category
    pub category_id: Option<String>,
    /// Only jobs of this kind
    pub kind: Option<JobKind>,
    /// Only jobs in this status
    pub status: Option<JobStatus>,
    /// At most this many jobs
    pub limit: Option<usize>,
}

/// Repository port for the job register.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a job unless its category already has a non-terminal one.
    ///
    /// Returns `DomainError::ActiveJobExists` when the guard trips.
    async fn create_exclusive(&self, job: &Job) -> DomainResult<()>;

    /// Get a job by id
    async fn get(&self, id: Uuid) -> DomainResult<Option<Job>>;

    /// Replace a job record
    async fn update(&self, job: &Job) -> DomainResult<()>;

    /// Stamp `updated_at` on a non-terminal job without touching other
    /// fields. Returns false when the job is missing or terminal.
    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<bool>;

    /// Write progress counters and message on a non-terminal job without
    /// touching status or stop flags. Returns false when nothing was written.
    async fn record_progress(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<bool>;

    /// Record the snapshot a non-terminal job works on. Returns false when
    /// nothing was written.
    async fn attach_snapshot(&self, id: Uuid, snapshot_id: &str) -> DomainResult<bool>;

    /// The non-terminal job for a category, if any
    async fn find_active_for_category(&self, category_id: &str) -> DomainResult<Option<Job>>;

    /// List jobs, newest first
    async fn list(&self, filter: JobFilter) -> DomainResult<Vec<Job>>;
}
