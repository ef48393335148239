//! demand-corpus: keyword demand corpus pipeline
//!
//! Grows per-category keyword corpora toward a valid-keyword target,
//! validates search volumes through a rate-gated provider client, and
//! certifies snapshots against FULL/LITE gate profiles. Long-running
//! operations run as persisted jobs with heartbeats, cooperative stop and
//! zombie reaping.
//!
//! # Architecture
//!
//! - **Domain** (`domain`): models, errors and the ports adapters implement
//! - **Services** (`services`): growth engine, certification, job control,
//!   resilient calls, the shared rate gate and the pipeline
//! - **Adapters** (`adapters`): `SQLite` and in-memory stores, HTTP provider
//! - **Infrastructure** (`infrastructure`): configuration and logging
//! - **CLI** (`cli`): command-line interface

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
/// Growth, certification, job control and the provider client
pub mod services;

pub use domain::models::{
    CertificationPolicy, CertificationTier, Config, CorpusCounts, Job, JobKind, JobStatus, KeywordRow,
    KeywordStatus, Lifecycle, Snapshot,
};
pub use domain::ports::{JobRepository, SnapshotStore, VolumeProvider};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{GrowthEngine, JobControl, Operation, OperationOutcome, Pipeline};
