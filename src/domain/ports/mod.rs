//! Port trait definitions (Hexagonal Architecture)
//!
//! - `SnapshotStore`: snapshot and keyword row persistence
//! - `JobRepository`: the job register
//! - `VolumeProvider`: the external keyword-volume API

/// Job register port
pub mod job_repository;
/// Snapshot and keyword row persistence port
pub mod snapshot_store;
/// External keyword-volume API port
pub mod volume_provider;

pub use job_repository::{JobFilter, JobRepository};
pub use snapshot_store::SnapshotStore;
pub use volume_provider::{ProviderSurface, VolumeProvider, VolumeRecord, VolumeRequest};
