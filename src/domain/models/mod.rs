//! Domain models.

pub mod certification;
/// Configuration model and defaults
pub mod config;
pub mod failure;
pub mod job;
pub mod keyword;
pub mod snapshot;

pub use certification::{
    CertificationMetrics, CertificationPolicy, CertificationRecord, CertificationTier,
    CertificationVerdict, GateId, GateResult, HealthGrade,
};
pub use config::{
    CategoryDictionary, CertificationConfig, Config, DatabaseConfig, GrowthConfig, JobsConfig,
    LeanThresholds, LoggingConfig, ProviderConfig, ResilienceConfig, StandardThresholds,
};
pub use failure::{CallError, FailureClass};
pub use job::{Job, JobKind, JobMeta, JobProgress, JobStatus, ProgressPatch};
pub use keyword::{
    anchor_counts, keyword_id, normalize_keyword, AnchorCounts, CorpusCounts, IntentBucket,
    KeywordRow, KeywordStatus,
};
pub use snapshot::{Anchor, AnchorSource, CorpusKey, Lifecycle, Snapshot, SnapshotStats};
