//! Liveness and reaping across the job registry.

use chrono::{Duration, Utc};
use std::sync::Arc;

use demand_corpus::adapters::memory::InMemoryJobRepository;
use demand_corpus::domain::models::{JobKind, JobMeta, JobStatus, JobsConfig};
use demand_corpus::domain::ports::{JobFilter, JobRepository};
use demand_corpus::services::job_control::JobLiveness;
use demand_corpus::services::JobControl;
use uuid::Uuid;

fn jobs_config() -> JobsConfig {
    JobsConfig {
        heartbeat_interval_ms: 1_000,
        stale_after_secs: 60,
        zombie_after_secs: 180,
    }
}

fn control() -> (Arc<InMemoryJobRepository>, JobControl) {
    let repo = Arc::new(InMemoryJobRepository::new());
    let control = JobControl::new(repo.clone(), &jobs_config());
    (repo, control)
}

async fn backdate(repo: &InMemoryJobRepository, id: Uuid, secs: i64) {
    let mut job = repo.get(id).await.unwrap().unwrap();
    job.updated_at = Utc::now() - Duration::seconds(secs);
    repo.update(&job).await.unwrap();
}

#[tokio::test]
async fn test_liveness_bands() {
    let (repo, control) = control();
    let job = control.start_job(JobKind::Grow, "razors", JobMeta::default()).await.unwrap();
    assert_eq!(control.liveness(&job), JobLiveness::Live);

    backdate(&repo, job.id, 90).await;
    let stale = repo.get(job.id).await.unwrap().unwrap();
    assert_eq!(control.liveness(&stale), JobLiveness::Stale);

    // stale jobs are reported, never reaped
    let listed = control.list_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(listed[0].status, JobStatus::Running);
}

#[tokio::test]
async fn test_list_reaps_zombies() {
    let (repo, control) = control();
    let job = control.start_job(JobKind::Grow, "razors", JobMeta::default()).await.unwrap();
    backdate(&repo, job.id, 600).await;

    let listed = control.list_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, JobStatus::Failed);
    assert!(listed[0].error.as_deref().unwrap_or_default().contains("zombie"));
    assert!(listed[0].completed_at.is_some());

    let stored = repo.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(control.liveness(&stored), JobLiveness::Live);
}

#[tokio::test]
async fn test_stop_requested_zombie_ends_stopped() {
    let (repo, control) = control();
    let job = control.start_job(JobKind::Certify, "razors", JobMeta::default()).await.unwrap();
    control.request_stop(job.id).await.unwrap();
    backdate(&repo, job.id, 600).await;

    let reaped = control.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(reaped.status, JobStatus::Stopped);
    assert!(reaped.error.is_none());
    assert!(reaped.message.as_deref().unwrap_or_default().contains("zombie"));
}

#[tokio::test]
async fn test_zombie_frees_the_category() {
    let (repo, control) = control();
    let job = control.start_job(JobKind::Grow, "razors", JobMeta::default()).await.unwrap();
    assert!(control.start_job(JobKind::Validate, "razors", JobMeta::default()).await.is_err());

    backdate(&repo, job.id, 600).await;
    assert!(control.get_active_job_for_category("razors").await.unwrap().is_none());

    let next = control.start_job(JobKind::Validate, "razors", JobMeta::default()).await.unwrap();
    assert_ne!(next.id, job.id);
    assert_eq!(
        control.get_active_job_for_category("razors").await.unwrap().map(|j| j.id),
        Some(next.id)
    );
}

#[tokio::test]
async fn test_finish_is_exactly_once() {
    let (_, control) = control();
    let job = control.start_job(JobKind::Grow, "razors", JobMeta::default()).await.unwrap();

    assert!(control.finish_job(job.id, JobStatus::Completed, Some("done".into())).await.unwrap());
    assert!(!control.finish_job(job.id, JobStatus::Failed, Some("late".into())).await.unwrap());

    let stored = control.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.message.as_deref(), Some("done"));
    assert!(!control.heartbeat(job.id).await.unwrap());
}
