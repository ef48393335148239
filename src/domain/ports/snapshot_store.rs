use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{CorpusKey, KeywordRow, Snapshot};

/// Durable storage for snapshots and their keyword rows.
///
/// Row writes replace the whole collection for a snapshot; the last writer
/// wins. Callers read-modify-write the full row set.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Get a snapshot by id
    async fn get_snapshot_by_id(&self, snapshot_id: &str) -> DomainResult<Option<Snapshot>>;

    /// Insert or replace a snapshot record
    async fn write_snapshot(&self, snapshot: &Snapshot) -> DomainResult<()>;

    /// Read every keyword row of a snapshot
    async fn read_all_keyword_rows(&self, snapshot_id: &str) -> DomainResult<Vec<KeywordRow>>;

    /// Replace every keyword row of a snapshot
    async fn write_keyword_rows(&self, snapshot_id: &str, rows: &[KeywordRow]) -> DomainResult<()>;

    /// Resolve the active snapshot id for a market
    async fn get_active_snapshot_id(&self, key: &CorpusKey) -> DomainResult<Option<String>>;

    /// Point the market at a snapshot
    async fn set_active_snapshot_id(&self, key: &CorpusKey, snapshot_id: &str) -> DomainResult<()>;

    /// List snapshots for a category, newest first
    async fn list_snapshots(&self, category_id: &str) -> DomainResult<Vec<Snapshot>>;
}
