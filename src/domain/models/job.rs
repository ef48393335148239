//! Job domain model.
//!
//! Jobs are the persisted record of one long-running pipeline operation on a
//! category. They are heartbeated while work is in flight and finalized
//! exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Recorded, not yet started
    Queued,
    /// Work in flight
    Running,
    /// An operator asked the job to stop; the worker has not acknowledged yet
    StopRequested,
    /// Worker acknowledged a stop request
    Stopped,
    /// Finished normally
    Completed,
    /// Finished with an error
    Failed,
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Queued
    }
}

impl JobStatus {
    /// Stored form of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::StopRequested => "stop_requested",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse a stored status, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "stop_requested" => Some(Self::StopRequested),
            "stopped" => Some(Self::Stopped),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// True once the job can no longer change
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Failed)
    }

    /// True while the job holds its category
    pub const fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Statuses reachable from this one
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Queued => vec![Self::Running, Self::StopRequested, Self::Stopped, Self::Failed],
            Self::Running => vec![Self::StopRequested, Self::Stopped, Self::Completed, Self::Failed],
            Self::StopRequested => vec![Self::Stopped, Self::Completed, Self::Failed],
            Self::Stopped | Self::Completed | Self::Failed => vec![],
        }
    }

    /// Whether the transition table allows `new_status`
    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of pipeline operation a job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Corpus growth loop
    Grow,
    /// Validation of pending rows only
    Validate,
    /// Certification evaluation
    Certify,
    /// Reset, regrow and certify under the lean policy
    Rebuild,
}

impl JobKind {
    /// Stored form of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grow => "grow",
            Self::Validate => "validate",
            Self::Certify => "certify",
            Self::Rebuild => "rebuild",
        }
    }

    /// Parse a stored kind, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "grow" => Some(Self::Grow),
            "validate" => Some(Self::Validate),
            "certify" => Some(Self::Certify),
            "rebuild" => Some(Self::Rebuild),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress counters surfaced to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    /// Units of work finished
    pub processed: u64,
    /// Units of work expected, 0 when unknown
    pub total: u64,
}

/// Partial progress update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressPatch {
    /// New processed count, if changed
    pub processed: Option<u64>,
    /// New total, if changed
    pub total: Option<u64>,
    /// New progress message, if changed
    pub message: Option<String>,
}

impl ProgressPatch {
    /// A patch carrying only a message
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Set both counters
    #[must_use]
    pub const fn counts(mut self, processed: u64, total: u64) -> Self {
        self.processed = Some(processed);
        self.total = Some(total);
        self
    }
}

/// Extra data recorded when a job starts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobMeta {
    /// Snapshot the job works on
    pub snapshot_id: Option<String>,
    /// Initial progress message
    pub message: Option<String>,
}

/// A persisted job record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job id
    pub id: Uuid,
    /// Category the job holds
    pub category_id: String,
    /// Operation the job runs
    pub kind: JobKind,
    /// Current status
    pub status: JobStatus,
    /// Progress counters
    pub progress: JobProgress,
    /// Snapshot the job works on, once known
    pub snapshot_id: Option<String>,
    /// Latest progress or final message
    pub message: Option<String>,
    /// Failure reason for FAILED jobs
    pub error: Option<String>,
    /// Set by a stop request, read at every checkpoint
    pub stop_requested: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last heartbeat or progress write
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A QUEUED job for a category
    pub fn new(kind: JobKind, category_id: impl Into<String>, meta: JobMeta, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            category_id: category_id.into(),
            kind,
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            snapshot_id: meta.snapshot_id,
            message: meta.message,
            error: None,
            stop_requested: false,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether the job may move to `new_status`
    pub fn can_transition_to(&self, new_status: JobStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    /// Move to `new_status`, stamping `updated_at` and, for terminal states,
    /// `completed_at`.
    pub fn transition_to(&mut self, new_status: JobStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.can_transition_to(new_status) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
                reason: "transition not allowed".to_string(),
            });
        }
        self.status = new_status;
        self.updated_at = now;
        if new_status.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Apply a progress patch and stamp `updated_at`
    pub fn apply_progress(&mut self, patch: ProgressPatch, now: DateTime<Utc>) {
        if let Some(processed) = patch.processed {
            self.progress.processed = processed;
        }
        if let Some(total) = patch.total {
            self.progress.total = total;
        }
        if patch.message.is_some() {
            self.message = patch.message;
        }
        self.updated_at = now;
    }

    /// Time since the last heartbeat or update.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobKind::Grow, "shaving", JobMeta::default(), Utc::now())
    }

    #[test]
    fn test_new_job_is_queued() {
        let j = job();
        assert_eq!(j.status, JobStatus::Queued);
        assert!(!j.stop_requested);
        assert!(j.completed_at.is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(JobStatus::Stopped.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::StopRequested.is_active());
        assert!(JobStatus::Queued.is_active());
    }

    #[test]
    fn test_transitions() {
        let mut j = job();
        j.transition_to(JobStatus::Running, Utc::now()).unwrap();
        j.transition_to(JobStatus::StopRequested, Utc::now()).unwrap();
        j.transition_to(JobStatus::Stopped, Utc::now()).unwrap();
        assert!(j.completed_at.is_some());
        assert!(j.transition_to(JobStatus::Failed, Utc::now()).is_err());
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for status in [JobStatus::Stopped, JobStatus::Completed, JobStatus::Failed] {
            assert!(status.valid_transitions().is_empty());
        }
    }

    #[test]
    fn test_apply_progress_keeps_unset_fields() {
        let mut j = job();
        j.apply_progress(ProgressPatch::message("pass 1").counts(3, 12), Utc::now());
        j.apply_progress(ProgressPatch { processed: Some(4), ..ProgressPatch::default() }, Utc::now());
        assert_eq!(j.progress, JobProgress { processed: 4, total: 12 });
        assert_eq!(j.message.as_deref(), Some("pass 1"));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!(JobKind::from_str("REBUILD"), Some(JobKind::Rebuild));
        assert_eq!(JobKind::from_str("hydrate"), None);
    }
}
