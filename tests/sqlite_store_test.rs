//! File-backed SQLite persistence across process restarts.

mod common;

use std::sync::Arc;
use tempfile::TempDir;

use common::{test_config, CATEGORY};
use demand_corpus::adapters::memory::{FixtureVolumeProvider, UnknownKeywords};
use demand_corpus::adapters::sqlite::{initialize_database, SqliteJobRepository, SqliteSnapshotStore};
use demand_corpus::cli::AppContext;
use demand_corpus::domain::models::{Config, DatabaseConfig, JobStatus, KeywordStatus, Lifecycle};
use demand_corpus::domain::ports::{JobFilter, SnapshotStore};
use demand_corpus::services::{Operation, OperationOutcome, Pipeline};

fn database(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        path: dir.path().join("nested").join("corpus.db").to_string_lossy().into_owned(),
        max_connections: 2,
    }
}

async fn open(config: &Config, database: &DatabaseConfig) -> (Arc<SqliteSnapshotStore>, Pipeline) {
    let pool = initialize_database(database).await.unwrap();
    let store = Arc::new(SqliteSnapshotStore::new(pool.clone()));
    let repo = Arc::new(SqliteJobRepository::new(pool));
    let provider = Arc::new(FixtureVolumeProvider::new(UnknownKeywords::Volume(250)));
    let pipeline = AppContext::pipeline(config, store.clone(), repo, provider);
    (store, pipeline)
}

#[tokio::test]
async fn test_grown_corpus_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = test_config();
    let db = database(&dir);

    let snapshot_id = {
        let (_, pipeline) = open(&config, &db).await;
        let outcome = pipeline
            .run(
                CATEGORY,
                None,
                Operation::Grow {
                    target_valid: Some(5),
                    max_attempts: Some(3),
                },
            )
            .await
            .unwrap();
        let OperationOutcome::Grown(report) = outcome else {
            panic!("expected a growth report");
        };
        report.snapshot_id
    };

    // reopening reruns migrations against the existing file
    let (store, pipeline) = open(&config, &db).await;
    let active = pipeline.snapshots().resolve_active(CATEGORY).await.unwrap().unwrap();
    assert_eq!(active.id, snapshot_id);
    assert_eq!(active.lifecycle, Lifecycle::Validated);

    let rows = store.read_all_keyword_rows(&snapshot_id).await.unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.status == KeywordStatus::Valid && r.volume == Some(250)));

    let jobs = pipeline.jobs().list_jobs(JobFilter::default()).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].snapshot_id.as_deref(), Some(snapshot_id.as_str()));
}

#[tokio::test]
async fn test_active_job_blocks_across_connections() {
    let dir = TempDir::new().unwrap();
    let config = test_config();
    let db = database(&dir);

    let (_, first) = open(&config, &db).await;
    let (_, second) = open(&config, &db).await;
    let job = first
        .jobs()
        .start_job(demand_corpus::JobKind::Grow, CATEGORY, Default::default())
        .await
        .unwrap();

    assert!(second
        .jobs()
        .start_job(demand_corpus::JobKind::Validate, CATEGORY, Default::default())
        .await
        .is_err());
    second.jobs().request_stop(job.id).await.unwrap();

    let seen = first.jobs().get_job(job.id).await.unwrap().unwrap();
    assert!(seen.stop_requested);
    assert_eq!(seen.status, JobStatus::StopRequested);
}
