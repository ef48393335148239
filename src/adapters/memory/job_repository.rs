//! In-memory implementation of the JobRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Job, JobProgress};
use crate::domain::ports::{JobFilter, JobRepository};

/// Job register held in memory
#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<HashMap<Uuid, Job>>,
    touches: Mutex<HashMap<Uuid, u64>>,
}

impl InMemoryJobRepository {
    /// An empty register
    pub fn new() -> Self {
        Self::default()
    }

    /// Heartbeat writes accepted for a job.
    pub fn touch_count(&self, id: Uuid) -> u64 {
        self.touches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_exclusive(&self, job: &Job) -> DomainResult<()> {
        let mut jobs = self.jobs.write().await;
        if let Some(active) = jobs
            .values()
            .find(|j| j.category_id == job.category_id && j.status.is_active())
        {
            return Err(DomainError::ActiveJobExists {
                category_id: job.category_id.clone(),
                job_id: active.id,
            });
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Job>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, job: &Job) -> DomainResult<()> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&job.id) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(DomainError::JobNotFound(job.id)),
        }
    }

    async fn touch(&self, id: Uuid, at: DateTime<Utc>) -> DomainResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status.is_active() => {
                job.updated_at = at;
                *self
                    .touches
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(id)
                    .or_default() += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_progress(
        &self,
        id: Uuid,
        progress: JobProgress,
        message: Option<&str>,
        at: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status.is_active() => {
                job.progress = progress;
                job.message = message.map(str::to_string);
                job.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn attach_snapshot(&self, id: Uuid, snapshot_id: &str) -> DomainResult<bool> {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status.is_active() => {
                job.snapshot_id = Some(snapshot_id.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_active_for_category(&self, category_id: &str) -> DomainResult<Option<Job>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|j| j.category_id == category_id && j.status.is_active())
            .cloned())
    }

    async fn list(&self, filter: JobFilter) -> DomainResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| filter.category_id.as_ref().is_none_or(|c| &j.category_id == c))
            .filter(|j| filter.kind.is_none_or(|k| j.kind == k))
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }
}
