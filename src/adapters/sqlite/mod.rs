//! SQLite adapters for snapshots and the job register.

pub mod connection;
pub mod job_repository;
pub mod migrations;
pub mod snapshot_store;

pub use connection::{create_pool, create_test_pool, database_url, ConnectionError};
pub use job_repository::SqliteJobRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use snapshot_store::SqliteSnapshotStore;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::DatabaseConfig;

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Decode a JSON column
pub fn parse_json<T: DeserializeOwned>(s: &str) -> DomainResult<T> {
    Ok(serde_json::from_str(s)?)
}

/// Decode a nullable JSON column
pub fn parse_optional_json<T: DeserializeOwned>(s: Option<String>) -> DomainResult<Option<T>> {
    s.as_deref().map(parse_json).transpose()
}

/// SQLite integers are signed; counts above `i64::MAX` saturate.
pub fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Read a count column; negative values read as 0
pub fn from_db_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Errors raised while initializing the database
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Pool creation failed
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    /// Migrations failed
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Open the configured database and bring its schema up to date.
pub async fn initialize_database(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(config).await?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}

/// In-memory pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await?;
    Ok(pool)
}
