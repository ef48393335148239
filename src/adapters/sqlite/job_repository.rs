//! SQLite implementation of the JobRepository.
//!
//! The one-active-job-per-category rule is a partial unique index on `jobs`,
//! so concurrent starters race on the insert and exactly one wins.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::adapters::sqlite::{from_db_count, parse_datetime, parse_optional_datetime, parse_uuid, to_db_count};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Job, JobKind, JobProgress, JobStatus};
use crate::domain::ports::{JobFilter, JobRepository};

const ACTIVE_STATUSES: &str = "('queued', 'running', 'stop_requested')";

/// Job register backed by SQLite
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

impl SqliteJobRepository {
    /// A repository over `pool`
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl JobRepository for SqliteJobRepository {
    async fn create_exclusive(&self, job: &Job) -> DomainResult<()> {
        let result = sqlx::query(
            r"INSERT INTO jobs (id, category_id, kind, status, processed, total, snapshot_id, message, error, stop_requested, created_at, updated_at, completed_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(job.id.to_string())
        .bind(&job.category_id)
        .bind(job.kind.as_str())
        .bind(job.status.as_str())
        .bind(to_db_count(job.progress.processed))
        .bind(to_db_count(job.progress.total))
        .bind(&job.snapshot_id)
        .bind(&job.message)
        .bind(&job.error)
        .bind(job.stop_requested)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(job.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                let active = self.find_active_for_category(&job.category_id).await?;
                Err(DomainError::ActiveJobExists {
                    category_id: job.category_id.clone(),
                    job_id: active.map_or(Uuid::nil(), |j| j.id),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, job: &Job) -> DomainResult<()> {
        let result = sqlx::query(
            r"UPDATE jobs SET status = ?, processed = ?, total = ?, snapshot_id = ?, message = ?, error = ?,
                stop_requested = ?, updated_at = ?, completed_at = ?
              WHERE id = ?",
        )
        .bind(job.status.as_str())
        .bind(to_db_count(job.progress.processed))
        .bind(to_db_count(job.progress.total))
        .bind(&job.snapshot_id)
        .bind(&job.message)
        .bind(&job.error)
        .bind(job.stop_requested)
        .bind(job.updated_at.to_rfc3339())
        .bind(job.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(job.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::JobNotFound(job.id));
        }
        Ok(())
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE jobs SET updated_at = ? WHERE id = ? AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_progress(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE jobs SET processed = ?, total = ?, message = ?, updated_at = ? WHERE id = ? AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(to_db_count(progress.processed))
        .bind(to_db_count(progress.total))
        .bind(message)
        .bind(at.to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn attach_snapshot(&self, id: Uuid, snapshot_id: &str) -> DomainResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE jobs SET snapshot_id = ? WHERE id = ? AND status IN {ACTIVE_STATUSES}"
        ))
        .bind(snapshot_id)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_active_for_category(&self, category_id: &str) -> DomainResult<Option<Job>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT * FROM jobs WHERE category_id = ? AND status IN {ACTIVE_STATUSES} LIMIT 1"
        ))
        .bind(category_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, filter: JobFilter) -> DomainResult<Vec<Job>> {
        let limit = filter.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let kind = filter.kind.map(|k| k.as_str());
        let status = filter.status.map(|s| s.as_str());
        let rows: Vec<JobRow> = sqlx::query_as(
            r"SELECT * FROM jobs
              WHERE (? IS NULL OR category_id = ?)
                AND (? IS NULL OR kind = ?)
                AND (? IS NULL OR status = ?)
              ORDER BY created_at DESC
              LIMIT ?",
        )
        .bind(&filter.category_id)
        .bind(&filter.category_id)
        .bind(kind)
        .bind(kind)
        .bind(status)
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    category_id: String,
    kind: String,
    status: String,
    processed: i64,
    total: i64,
    snapshot_id: Option<String>,
    message: Option<String>,
    error: Option<String>,
    stop_requested: bool,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = DomainError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let kind = JobKind::from_str(&row.kind)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid job kind: {}", row.kind)))?;
        let status = JobStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid job status: {}", row.status)))?;

        Ok(Self {
            id: parse_uuid(&row.id)?,
            category_id: row.category_id,
            kind,
            status,
            progress: JobProgress {
                processed: from_db_count(row.processed),
                total: from_db_count(row.total),
            },
            snapshot_id: row.snapshot_id,
            message: row.message,
            error: row.error,
            stop_requested: row.stop_requested,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            completed_at: parse_optional_datetime(row.completed_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::JobMeta;

    async fn repo() -> SqliteJobRepository {
        SqliteJobRepository::new(create_migrated_test_pool().await.unwrap())
    }

    fn job(category: &str) -> Job {
        Job::new(JobKind::Grow, category, JobMeta::default(), Utc::now())
    }

    #[tokio::test]
    async fn test_partial_index_allows_one_active_job_per_category() {
        let repo = repo().await;
        let first = job("shaving");
        repo.create_exclusive(&first).await.unwrap();

        let err = repo.create_exclusive(&job("shaving")).await.unwrap_err();
        match err {
            DomainError::ActiveJobExists { job_id, .. } => assert_eq!(job_id, first.id),
            other => panic!("unexpected error: {other}"),
        }
        repo.create_exclusive(&job("oral-care")).await.unwrap();

        let mut done = first.clone();
        done.transition_to(JobStatus::Failed, Utc::now()).unwrap();
        repo.update(&done).await.unwrap();
        repo.create_exclusive(&job("shaving")).await.unwrap();
    }

    #[tokio::test]
    async fn test_touch_and_progress_skip_terminal_jobs() {
        let repo = repo().await;
        let mut j = job("shaving");
        repo.create_exclusive(&j).await.unwrap();

        let progress = JobProgress { processed: 2, total: 12 };
        assert!(repo.record_progress(j.id, progress, Some("pass 2"), Utc::now()).await.unwrap());
        let loaded = repo.get(j.id).await.unwrap().unwrap();
        assert_eq!(loaded.progress, progress);
        assert_eq!(loaded.message.as_deref(), Some("pass 2"));

        j.transition_to(JobStatus::Running, Utc::now()).unwrap();
        j.transition_to(JobStatus::Completed, Utc::now()).unwrap();
        repo.update(&j).await.unwrap();
        assert!(!repo.touch(j.id, Utc::now()).await.unwrap());
        assert!(!repo.record_progress(j.id, progress, None, Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_and_limits() {
        let repo = repo().await;
        for category in ["shaving", "oral-care", "skin-care"] {
            repo.create_exclusive(&job(category)).await.unwrap();
        }
        let all = repo.list(JobFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);

        let filtered = repo
            .list(JobFilter {
                category_id: Some("oral-care".to_string()),
                ..JobFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let limited = repo
            .list(JobFilter {
                limit: Some(2),
                ..JobFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
