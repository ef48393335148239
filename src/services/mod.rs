pub mod anchor_assignment;
pub mod candidate_generator;
pub mod certification;
pub mod corpus_health;
pub mod growth_engine;
pub mod job_control;
pub mod keyword_guard;
pub mod pipeline;
pub mod resilient_call;
pub mod snapshot_service;
pub mod task_pool;
pub mod volume_gate;

pub use certification::{CertificationOutcome, CertificationService};
pub use growth_engine::{GrowthEngine, GrowthError, GrowthParams, GrowthReport, GrowthStatus};
pub use job_control::{JobContext, JobControl, JobRunError};
pub use pipeline::{Operation, OperationOutcome, Pipeline, PipelineError};
pub use snapshot_service::SnapshotService;
pub use task_pool::TaskPool;
pub use volume_gate::{BatchVolumeClient, RateGate};
