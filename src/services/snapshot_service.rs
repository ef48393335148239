//! Snapshot drafting, lookup and the rebuild reset.

use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Anchor, CategoryDictionary, CorpusCounts, CorpusKey, KeywordRow, Lifecycle, Snapshot,
};
use crate::domain::ports::SnapshotStore;
use crate::services::corpus_health::{compute_health, HealthReport};

/// Current state of a snapshot, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    /// The snapshot
    pub snapshot: Snapshot,
    /// Whether it is the category's active snapshot
    pub active: bool,
    /// Counts from the stored rows
    pub counts: CorpusCounts,
    /// Health diagnostics
    pub health: HealthReport,
}

/// Snapshot lookup, drafting and lifecycle resets
pub struct SnapshotService {
    store: Arc<dyn SnapshotStore>,
    categories: BTreeMap<String, CategoryDictionary>,
    country: String,
    language: String,
}

impl SnapshotService {
    /// A service over `store` for the configured categories and market
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        categories: BTreeMap<String, CategoryDictionary>,
        country: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            store,
            categories,
            country: country.into(),
            language: language.into(),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Market key for a category
    pub fn corpus_key(&self, category_id: &str) -> CorpusKey {
        CorpusKey::new(category_id, &self.country, &self.language)
    }

    /// Dictionary for a configured category
    pub fn dictionary(&self, category_id: &str) -> DomainResult<&CategoryDictionary> {
        self.categories
            .get(category_id)
            .ok_or_else(|| DomainError::UnknownCategory(category_id.to_string()))
    }

    /// Configured category ids
    pub fn category_ids(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    /// Create a DRAFT snapshot with the category's dictionary anchors.
    ///
    /// Becomes the active snapshot when the market has none, or when
    /// `make_active` is set.
    pub async fn draft_snapshot(&self, category_id: &str, make_active: bool) -> DomainResult<Snapshot> {
        let dictionary = self.dictionary(category_id)?;
        let anchors = dictionary
            .anchors
            .iter()
            .enumerate()
            .map(|(i, name)| Anchor::scan(name.clone(), u32::try_from(i).unwrap_or(u32::MAX)))
            .collect();
        let key = self.corpus_key(category_id);
        let snapshot = Snapshot::draft(&key, anchors, Utc::now());
        self.store.write_snapshot(&snapshot).await?;
        self.store.write_keyword_rows(&snapshot.id, &[]).await?;

        let has_active = self.store.get_active_snapshot_id(&key).await?.is_some();
        if make_active || !has_active {
            self.store.set_active_snapshot_id(&key, &snapshot.id).await?;
        }
        info!(
            category_id,
            snapshot_id = %snapshot.id,
            anchors = snapshot.anchors.len(),
            "snapshot drafted"
        );
        Ok(snapshot)
    }

    /// Fetch a snapshot or fail with `SnapshotNotFound`
    pub async fn get(&self, snapshot_id: &str) -> DomainResult<Snapshot> {
        self.store
            .get_snapshot_by_id(snapshot_id)
            .await?
            .ok_or_else(|| DomainError::SnapshotNotFound(snapshot_id.to_string()))
    }

    /// All rows of a snapshot
    pub async fn rows(&self, snapshot_id: &str) -> DomainResult<Vec<KeywordRow>> {
        self.store.read_all_keyword_rows(snapshot_id).await
    }

    /// The active snapshot for a category, if any.
    pub async fn resolve_active(&self, category_id: &str) -> DomainResult<Option<Snapshot>> {
        let key = self.corpus_key(category_id);
        match self.store.get_active_snapshot_id(&key).await? {
            Some(id) => self.store.get_snapshot_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// `snapshot_id` if given, else the active snapshot, else a fresh draft.
    pub async fn resolve_or_draft(&self, category_id: &str, snapshot_id: Option<&str>) -> DomainResult<Snapshot> {
        if let Some(id) = snapshot_id {
            let snapshot = self.get(id).await?;
            if snapshot.category_id != category_id {
                return Err(DomainError::ValidationFailed(format!(
                    "snapshot {id} belongs to {}, not {category_id}",
                    snapshot.category_id
                )));
            }
            return Ok(snapshot);
        }
        match self.resolve_active(category_id).await? {
            Some(snapshot) => Ok(snapshot),
            None => self.draft_snapshot(category_id, true).await,
        }
    }

    /// Explicit lifecycle downgrade so a certified snapshot can be grown again.
    pub async fn reset_for_rebuild(&self, snapshot_id: &str) -> DomainResult<Snapshot> {
        let mut snapshot = self.get(snapshot_id).await?;
        let rows = self.rows(snapshot_id).await?;
        let from = snapshot.lifecycle;
        snapshot.reset_for_rebuild(!rows.is_empty(), Utc::now());
        snapshot.apply_counts(CorpusCounts::from_rows(&rows), Utc::now());
        self.store.write_snapshot(&snapshot).await?;
        info!(
            snapshot_id,
            category_id = %snapshot.category_id,
            from = %from,
            to = %snapshot.lifecycle,
            "snapshot reset for rebuild"
        );
        Ok(snapshot)
    }

    /// Counts, health and active flag for a snapshot
    pub async fn status(&self, snapshot_id: &str) -> DomainResult<SnapshotStatus> {
        let snapshot = self.get(snapshot_id).await?;
        let rows = self.rows(snapshot_id).await?;
        let active = self.store.get_active_snapshot_id(&snapshot.key()).await?.as_deref() == Some(snapshot_id);
        Ok(SnapshotStatus {
            counts: CorpusCounts::from_rows(&rows),
            health: compute_health(&snapshot, &rows),
            active,
            snapshot,
        })
    }

    /// Snapshots of a category, newest first
    pub async fn list(&self, category_id: &str) -> DomainResult<Vec<Snapshot>> {
        self.store.list_snapshots(category_id).await
    }
}

/// True when growth may write to a snapshot at this lifecycle.
pub const fn is_growable(lifecycle: Lifecycle) -> bool {
    !lifecycle.is_certified()
}
