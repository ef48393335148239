//! Shared fixtures for integration tests.
//!
//! A one-anchor "razors" category keeps candidate sets small: a single
//! brand and head term yield sixteen template keywords per snapshot.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use demand_corpus::adapters::memory::{InMemoryJobRepository, InMemorySnapshotStore};
use demand_corpus::cli::AppContext;
use demand_corpus::domain::models::{CategoryDictionary, Config, KeywordRow, KeywordStatus};
use demand_corpus::domain::ports::{SnapshotStore, VolumeProvider};
use demand_corpus::services::Pipeline;

pub const CATEGORY: &str = "razors";

pub fn razors_dictionary() -> CategoryDictionary {
    CategoryDictionary {
        anchors: vec!["Razors".to_string()],
        head_terms: vec!["razor".to_string()],
        brands: vec!["gillette".to_string()],
        discovery_seeds: Vec::new(),
        excluded_tokens: vec!["women".to_string()],
    }
}

/// Config with no pacing, no retries, no quota and discovery switched off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    let mut categories = BTreeMap::new();
    categories.insert(CATEGORY.to_string(), razors_dictionary());
    let mut blades = razors_dictionary();
    blades.anchors = vec!["Blades".to_string()];
    blades.head_terms = vec!["blade".to_string()];
    categories.insert("blades".to_string(), blades);
    config.categories = categories;

    config.growth.pass_delay_ms = 0;
    config.growth.discovery_passes = 0;
    config.growth.anchor_concurrency = 1;
    config.resilience.max_retries = 0;
    config.resilience.base_delay_ms = 1;
    config.resilience.jitter_max_ms = 0;
    config.provider.requests_per_minute = 0;
    config
}

pub struct Harness {
    pub store: Arc<InMemorySnapshotStore>,
    pub repo: Arc<InMemoryJobRepository>,
    pub pipeline: Pipeline,
}

impl Harness {
    pub fn new(config: &Config, provider: Arc<dyn VolumeProvider>) -> Self {
        let store = Arc::new(InMemorySnapshotStore::new());
        let repo = Arc::new(InMemoryJobRepository::new());
        let pipeline = AppContext::pipeline(config, store.clone(), repo.clone(), provider);
        Self { store, repo, pipeline }
    }

    pub async fn rows(&self, snapshot_id: &str) -> Vec<KeywordRow> {
        self.store.read_all_keyword_rows(snapshot_id).await.unwrap()
    }

    pub async fn active_snapshot_id(&self) -> String {
        self.pipeline
            .snapshots()
            .resolve_active(CATEGORY)
            .await
            .unwrap()
            .expect("category has an active snapshot")
            .id
    }
}

pub fn count_status(rows: &[KeywordRow], status: KeywordStatus) -> usize {
    rows.iter().filter(|r| r.status == status).count()
}

/// Initialize a test subscriber; safe to call from every test.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
