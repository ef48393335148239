//! Domain errors for the demand corpus pipeline.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors raised by stores, the job register and lifecycle guards.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No snapshot with this id, or no active snapshot
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// No job with this id
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    /// The category already has a non-terminal job
    #[error("Category {category_id} already has an active job: {job_id}")]
    ActiveJobExists {
        /// Category that is busy
        category_id: String,
        /// Job holding the category
        job_id: Uuid,
    },

    /// A status change the transition table forbids
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
        /// Why the change was refused
        reason: String,
    },

    /// The snapshot's lifecycle forbids the operation
    #[error("Snapshot {snapshot_id} is {lifecycle}; {operation} is not allowed")]
    LifecycleGuard {
        /// Snapshot that was protected
        snapshot_id: String,
        /// Its lifecycle stage
        lifecycle: String,
        /// Operation that was refused
        operation: String,
    },

    /// The category is not configured
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Input rejected before any work ran
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Storage layer failure
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Stored JSON could not be read or written
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result alias for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        Self::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_job_message_names_category_and_job() {
        let id = Uuid::new_v4();
        let err = DomainError::ActiveJobExists {
            category_id: "shaving".to_string(),
            job_id: id,
        };
        let msg = err.to_string();
        assert!(msg.contains("shaving"));
        assert!(msg.contains(&id.to_string()));
    }

    #[test]
    fn test_serde_error_converts() {
        let err: DomainError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, DomainError::SerializationError(_)));
    }
}
