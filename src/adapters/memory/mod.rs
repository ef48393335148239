//! In-memory adapters for tests and dry runs.

pub mod job_repository;
pub mod snapshot_store;
pub mod volume_provider;

pub use job_repository::InMemoryJobRepository;
pub use snapshot_store::InMemorySnapshotStore;
pub use volume_provider::{FixtureVolumeProvider, UnknownKeywords};
