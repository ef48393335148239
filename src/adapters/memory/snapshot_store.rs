//! In-memory implementation of the SnapshotStore.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CorpusKey, KeywordRow, Snapshot};
use crate::domain::ports::SnapshotStore;

/// Snapshot store held in memory
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    rows: RwLock<HashMap<String, Vec<KeywordRow>>>,
    active: RwLock<HashMap<CorpusKey, String>>,
    row_writes: AtomicU64,
    discard_row_writes: AtomicBool,
}

impl InMemorySnapshotStore {
    /// An empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accepted row-collection writes.
    pub fn row_writes(&self) -> u64 {
        self.row_writes.load(Ordering::SeqCst)
    }

    /// Acknowledge row writes without storing them, like a store that loses
    /// writes.
    pub fn set_discard_row_writes(&self, discard: bool) {
        self.discard_row_writes.store(discard, Ordering::SeqCst);
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn get_snapshot_by_id(&self, snapshot_id: &str) -> DomainResult<Option<Snapshot>> {
        Ok(self.snapshots.read().await.get(snapshot_id).cloned())
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> DomainResult<()> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn read_all_keyword_rows(&self, snapshot_id: &str) -> DomainResult<Vec<KeywordRow>> {
        Ok(self
            .rows
            .read()
            .await
            .get(snapshot_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn write_keyword_rows(&self, snapshot_id: &str, rows: &[KeywordRow]) -> DomainResult<()> {
        if !self.snapshots.read().await.contains_key(snapshot_id) {
            return Err(DomainError::SnapshotNotFound(snapshot_id.to_string()));
        }
        if self.discard_row_writes.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.rows
            .write()
            .await
            .insert(snapshot_id.to_string(), rows.to_vec());
        self.row_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_active_snapshot_id(&self, key: &CorpusKey) -> DomainResult<Option<String>> {
        Ok(self.active.read().await.get(key).cloned())
    }

    async fn set_active_snapshot_id(&self, key: &CorpusKey, snapshot_id: &str) -> DomainResult<()> {
        self.active
            .write()
            .await
            .insert(key.clone(), snapshot_id.to_string());
        Ok(())
    }

    async fn list_snapshots(&self, category_id: &str) -> DomainResult<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .snapshots
            .read()
            .await
            .values()
            .filter(|s| s.category_id == category_id)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }
}
