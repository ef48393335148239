//! Wires configuration into stores, the provider client and the pipeline.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::http::HttpVolumeProvider;
use crate::adapters::sqlite::{initialize_database, SqliteJobRepository, SqliteSnapshotStore};
use crate::domain::models::Config;
use crate::domain::ports::{JobRepository, SnapshotStore, VolumeProvider};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::LoggerImpl;
use crate::services::resilient_call::TaskOptions;
use crate::services::{
    BatchVolumeClient, CertificationService, GrowthEngine, JobControl, Pipeline, RateGate, SnapshotService,
};

/// Everything a command needs, built once per invocation.
pub struct AppContext {
    /// Loaded configuration
    pub config: Config,
    /// Pipeline wired to the SQLite store and HTTP provider
    pub pipeline: Pipeline,
    _logger: LoggerImpl,
}

impl AppContext {
    /// Load config, start logging, open the database and wire services
    pub async fn build(config_path: Option<&Path>) -> Result<Self> {
        let config = ConfigLoader::load(config_path)?;
        let logger = LoggerImpl::init(&config.logging)?;

        let pool = initialize_database(&config.database)
            .await
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        let store: Arc<dyn SnapshotStore> = Arc::new(SqliteSnapshotStore::new(pool.clone()));
        let repo: Arc<dyn JobRepository> = Arc::new(SqliteJobRepository::new(pool));
        let provider: Arc<dyn VolumeProvider> =
            Arc::new(HttpVolumeProvider::new(&config.provider).context("Failed to build provider client")?);

        let pipeline = Self::pipeline(&config, store, repo, provider);
        Ok(Self {
            config,
            pipeline,
            _logger: logger,
        })
    }

    /// Assemble the service graph over the given adapters.
    pub fn pipeline(
        config: &Config,
        store: Arc<dyn SnapshotStore>,
        repo: Arc<dyn JobRepository>,
        provider: Arc<dyn VolumeProvider>,
    ) -> Pipeline {
        let gate = Arc::new(RateGate::from_config(&config.provider));
        let client = Arc::new(BatchVolumeClient::new(
            provider,
            gate,
            TaskOptions::from(&config.resilience),
            &config.provider,
        ));
        let jobs = Arc::new(JobControl::new(repo, &config.jobs));
        let snapshots = Arc::new(SnapshotService::new(
            store.clone(),
            config.categories.clone(),
            &config.provider.country,
            &config.provider.language_code,
        ));
        let engine = Arc::new(GrowthEngine::new(
            store.clone(),
            client,
            jobs.clone(),
            config.categories.clone(),
            config.growth.clone(),
        ));
        let certification = Arc::new(CertificationService::new(store, config.certification.clone()));
        Pipeline::new(snapshots, engine, certification, jobs)
    }
}
