//! SQLite implementation of the SnapshotStore.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    from_db_count, parse_datetime, parse_json, parse_optional_datetime, parse_optional_json, to_db_count,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{CorpusKey, IntentBucket, KeywordRow, KeywordStatus, Lifecycle, Snapshot};
use crate::domain::ports::SnapshotStore;

/// Snapshot store backed by SQLite
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    /// A store over `pool`
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn snapshot_exists(&self, snapshot_id: &str) -> DomainResult<bool> {
        let found: Option<(String,)> = sqlx::query_as("SELECT id FROM snapshots WHERE id = ?")
            .bind(snapshot_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn get_snapshot_by_id(&self, snapshot_id: &str) -> DomainResult<Option<Snapshot>> {
        let row: Option<SnapshotRow> = sqlx::query_as("SELECT * FROM snapshots WHERE id = ?")
            .bind(snapshot_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn write_snapshot(&self, snapshot: &Snapshot) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO snapshots (id, category_id, country, language, lifecycle, anchors, stats, certification, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
              ON CONFLICT(id) DO UPDATE SET
                lifecycle = excluded.lifecycle,
                anchors = excluded.anchors,
                stats = excluded.stats,
                certification = excluded.certification,
                updated_at = excluded.updated_at",
        )
        .bind(&snapshot.id)
        .bind(&snapshot.category_id)
        .bind(&snapshot.country)
        .bind(&snapshot.language)
        .bind(snapshot.lifecycle.as_str())
        .bind(serde_json::to_string(&snapshot.anchors)?)
        .bind(serde_json::to_string(&snapshot.stats)?)
        .bind(snapshot.certification.as_ref().map(serde_json::to_string).transpose()?)
        .bind(snapshot.created_at.to_rfc3339())
        .bind(snapshot.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn read_all_keyword_rows(&self, snapshot_id: &str) -> DomainResult<Vec<KeywordRow>> {
        let rows: Vec<KeywordDbRow> =
            sqlx::query_as("SELECT * FROM keyword_rows WHERE snapshot_id = ? ORDER BY position")
                .bind(snapshot_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn write_keyword_rows(&self, snapshot_id: &str, rows: &[KeywordRow]) -> DomainResult<()> {
        if !self.snapshot_exists(snapshot_id).await? {
            return Err(DomainError::SnapshotNotFound(snapshot_id.to_string()));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM keyword_rows WHERE snapshot_id = ?")
            .bind(snapshot_id)
            .execute(&mut *tx)
            .await?;

        for (position, row) in rows.iter().enumerate() {
            sqlx::query(
                r"INSERT OR REPLACE INTO keyword_rows
                  (snapshot_id, id, position, text, anchor_id, intent, status, volume, secondary_volume, cpc, competition_index, active, created_at, validated_at)
                  VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(snapshot_id)
            .bind(&row.id)
            .bind(i64::try_from(position).unwrap_or(i64::MAX))
            .bind(&row.text)
            .bind(&row.anchor_id)
            .bind(row.intent.as_str())
            .bind(row.status.as_str())
            .bind(row.volume.map(to_db_count))
            .bind(row.secondary_volume.map(to_db_count))
            .bind(row.cpc)
            .bind(row.competition_index)
            .bind(row.active)
            .bind(row.created_at.to_rfc3339())
            .bind(row.validated_at.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_active_snapshot_id(&self, key: &CorpusKey) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT snapshot_id FROM corpus_index WHERE category_id = ? AND country = ? AND language = ?",
        )
        .bind(&key.category_id)
        .bind(&key.country)
        .bind(&key.language)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| id))
    }

    async fn set_active_snapshot_id(&self, key: &CorpusKey, snapshot_id: &str) -> DomainResult<()> {
        if !self.snapshot_exists(snapshot_id).await? {
            return Err(DomainError::SnapshotNotFound(snapshot_id.to_string()));
        }
        sqlx::query(
            r"INSERT INTO corpus_index (category_id, country, language, snapshot_id, updated_at)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(category_id, country, language) DO UPDATE SET
                snapshot_id = excluded.snapshot_id,
                updated_at = excluded.updated_at",
        )
        .bind(&key.category_id)
        .bind(&key.country)
        .bind(&key.language)
        .bind(snapshot_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_snapshots(&self, category_id: &str) -> DomainResult<Vec<Snapshot>> {
        let rows: Vec<SnapshotRow> =
            sqlx::query_as("SELECT * FROM snapshots WHERE category_id = ? ORDER BY created_at DESC")
                .bind(category_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    id: String,
    category_id: String,
    country: String,
    language: String,
    lifecycle: String,
    anchors: String,
    stats: String,
    certification: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = DomainError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let lifecycle = Lifecycle::from_str(&row.lifecycle)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid lifecycle: {}", row.lifecycle)))?;

        Ok(Self {
            anchors: parse_json(&row.anchors)?,
            stats: parse_json(&row.stats)?,
            certification: parse_optional_json(row.certification)?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
            id: row.id,
            category_id: row.category_id,
            country: row.country,
            language: row.language,
            lifecycle,
        })
    }
}

#[derive(sqlx::FromRow)]
struct KeywordDbRow {
    id: String,
    text: String,
    anchor_id: String,
    intent: String,
    status: String,
    volume: Option<i64>,
    secondary_volume: Option<i64>,
    cpc: Option<f64>,
    competition_index: Option<f64>,
    active: bool,
    created_at: String,
    validated_at: Option<String>,
}

impl TryFrom<KeywordDbRow> for KeywordRow {
    type Error = DomainError;

    fn try_from(row: KeywordDbRow) -> Result<Self, Self::Error> {
        let intent = IntentBucket::from_str(&row.intent)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid intent: {}", row.intent)))?;
        let status = KeywordStatus::from_str(&row.status)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid keyword status: {}", row.status)))?;

        Ok(Self {
            id: row.id,
            text: row.text,
            anchor_id: row.anchor_id,
            intent,
            status,
            volume: row.volume.map(from_db_count),
            secondary_volume: row.secondary_volume.map(from_db_count),
            cpc: row.cpc,
            competition_index: row.competition_index,
            active: row.active,
            created_at: parse_datetime(&row.created_at)?,
            validated_at: parse_optional_datetime(row.validated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;
    use crate::domain::models::Anchor;

    async fn store() -> SqliteSnapshotStore {
        SqliteSnapshotStore::new(create_migrated_test_pool().await.unwrap())
    }

    fn snapshot() -> Snapshot {
        Snapshot::draft(
            &CorpusKey::new("shaving", "IN", "en"),
            vec![Anchor::scan("Razors & Blades", 0), Anchor::scan("Trimmers", 1)],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_snapshot_upsert_keeps_identity() {
        let store = store().await;
        let mut snap = snapshot();
        store.write_snapshot(&snap).await.unwrap();
        snap.lifecycle = Lifecycle::Hydrated;
        store.write_snapshot(&snap).await.unwrap();

        let loaded = store.get_snapshot_by_id(&snap.id).await.unwrap().unwrap();
        assert_eq!(loaded.lifecycle, Lifecycle::Hydrated);
        assert_eq!(loaded.anchors, snap.anchors);
        assert!(store.get_snapshot_by_id("snap_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_write_replaces_whole_set_in_order() {
        let store = store().await;
        let snap = snapshot();
        store.write_snapshot(&snap).await.unwrap();

        let now = Utc::now();
        let mut rows = vec![
            KeywordRow::unverified("gillette razor", "Razors & Blades", "shaving", now),
            KeywordRow::unverified("beard trimmer price", "Trimmers", "shaving", now),
        ];
        rows[1].record_volume(1900, Some(0.4), None, now);
        store.write_keyword_rows(&snap.id, &rows).await.unwrap();
        assert_eq!(store.read_all_keyword_rows(&snap.id).await.unwrap(), rows);

        store.write_keyword_rows(&snap.id, &rows[1..]).await.unwrap();
        let loaded = store.read_all_keyword_rows(&snap.id).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].volume, Some(1900));
    }

    #[tokio::test]
    async fn test_rows_for_missing_snapshot_are_rejected() {
        let err = store().await.write_keyword_rows("snap_missing", &[]).await.unwrap_err();
        assert!(matches!(err, DomainError::SnapshotNotFound(_)));
    }

    #[tokio::test]
    async fn test_active_pointer_moves() {
        let store = store().await;
        let first = snapshot();
        let second = snapshot();
        store.write_snapshot(&first).await.unwrap();
        store.write_snapshot(&second).await.unwrap();

        let key = first.key();
        assert!(store.get_active_snapshot_id(&key).await.unwrap().is_none());
        store.set_active_snapshot_id(&key, &first.id).await.unwrap();
        store.set_active_snapshot_id(&key, &second.id).await.unwrap();
        assert_eq!(store.get_active_snapshot_id(&key).await.unwrap(), Some(second.id.clone()));
        assert_eq!(store.list_snapshots("shaving").await.unwrap().len(), 2);
    }
}
