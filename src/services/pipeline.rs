//! Pipeline operations.
//!
//! Every operation resolves its snapshot, then runs under a job via
//! `JobControl::run_job`, which guarantees the job is finalized on success,
//! error, stop and panic alike.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::errors::DomainError;
use crate::domain::models::{CertificationPolicy, CertificationTier, GrowthConfig, JobKind, JobMeta, Snapshot};
use crate::services::certification::{CertificationOutcome, CertificationService};
use crate::services::growth_engine::{GrowthEngine, GrowthError, GrowthParams, GrowthReport, ValidationReport};
use crate::services::job_control::{JobContext, JobControl, JobExit, JobFailure, JobOutcome, JobRunError};
use crate::services::snapshot_service::SnapshotService;
use crate::services::task_pool::{PoolItem, TaskPool};

/// One pipeline operation on a category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Run the convergence loop
    Grow {
        /// Valid target; the configured default when `None`
        target_valid: Option<u64>,
        /// Pass budget; the configured default when `None`
        max_attempts: Option<u32>,
    },
    /// Validate pending rows only
    Validate,
    /// Evaluate and apply certification
    Certify {
        /// Tier to certify for
        tier: CertificationTier,
        /// Gate profile to evaluate with
        policy: CertificationPolicy,
    },
    /// Reset, regrow to the tier's rebuild target, certify with the lean policy
    Rebuild {
        /// Tier to rebuild toward
        tier: CertificationTier,
    },
}

impl Operation {
    /// Job kind recorded for the operation
    pub const fn kind(&self) -> JobKind {
        match self {
            Self::Grow { .. } => JobKind::Grow,
            Self::Validate => JobKind::Validate,
            Self::Certify { .. } => JobKind::Certify,
            Self::Rebuild { .. } => JobKind::Rebuild,
        }
    }

    /// Grow and rebuild may draft a snapshot; the others need an existing one.
    const fn may_draft(&self) -> bool {
        matches!(self, Self::Grow { .. } | Self::Rebuild { .. })
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Certify { tier, policy } => write!(f, "certify {tier} ({})", policy.as_str()),
            Self::Rebuild { tier } => write!(f, "rebuild {tier}"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}

/// Result of a pipeline operation
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationOutcome {
    /// Growth report
    Grown(GrowthReport),
    /// Validation report
    Validated(ValidationReport),
    /// Certification outcome
    Certified(CertificationOutcome),
    /// Growth and certification from a rebuild
    Rebuilt {
        /// Regrowth report
        growth: GrowthReport,
        /// Lean certification outcome
        certification: CertificationOutcome,
    },
}

impl JobOutcome for OperationOutcome {
    fn job_exit(&self) -> JobExit {
        match self {
            Self::Grown(report) => report.job_exit(),
            Self::Validated(report) => report.job_exit(),
            Self::Certified(outcome) => outcome.job_exit(),
            Self::Rebuilt { growth, certification } => match certification.job_exit() {
                JobExit::Completed(msg) => {
                    JobExit::Completed(format!("rebuilt to {} valid; {msg}", growth.counts.valid))
                }
                JobExit::Failed(msg) => JobExit::Failed(format!("rebuilt to {} valid; {msg}", growth.counts.valid)),
            },
        }
    }
}

/// Error from a pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Growth or validation failed
    #[error(transparent)]
    Growth(#[from] GrowthError),

    /// Storage, lifecycle or job register failure
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl JobFailure for PipelineError {
    fn is_stop(&self) -> bool {
        match self {
            Self::Growth(e) => e.is_stop(),
            Self::Domain(_) => false,
        }
    }
}

/// Result of `Pipeline::run`
pub type PipelineResult = Result<OperationOutcome, JobRunError<PipelineError>>;

/// Dispatches operations to services under a job
pub struct Pipeline {
    snapshots: Arc<SnapshotService>,
    engine: Arc<GrowthEngine>,
    certification: Arc<CertificationService>,
    jobs: Arc<JobControl>,
    growth: GrowthConfig,
}

impl Pipeline {
    /// A pipeline over the given services
    pub fn new(
        snapshots: Arc<SnapshotService>,
        engine: Arc<GrowthEngine>,
        certification: Arc<CertificationService>,
        jobs: Arc<JobControl>,
    ) -> Self {
        Self {
            growth: engine.config().clone(),
            snapshots,
            engine,
            certification,
            jobs,
        }
    }

    /// Snapshot service
    pub const fn snapshots(&self) -> &Arc<SnapshotService> {
        &self.snapshots
    }

    /// Job control
    pub const fn jobs(&self) -> &Arc<JobControl> {
        &self.jobs
    }

    /// Certification service
    pub const fn certification(&self) -> &Arc<CertificationService> {
        &self.certification
    }

    /// The snapshot an operation targets. `None` means a drafting operation
    /// on a category with no active snapshot; the draft is created once the
    /// job holds the category.
    async fn resolve(
        &self,
        category_id: &str,
        snapshot_id: Option<&str>,
        operation: Operation,
    ) -> Result<Option<Snapshot>, DomainError> {
        self.snapshots.dictionary(category_id)?;
        if let Some(id) = snapshot_id {
            return self.snapshots.resolve_or_draft(category_id, Some(id)).await.map(Some);
        }
        match self.snapshots.resolve_active(category_id).await? {
            Some(snapshot) => Ok(Some(snapshot)),
            None if operation.may_draft() => Ok(None),
            None => Err(DomainError::SnapshotNotFound(format!("no active snapshot for {category_id}"))),
        }
    }

    /// Run one operation for one category.
    pub async fn run(&self, category_id: &str, snapshot_id: Option<&str>, operation: Operation) -> PipelineResult {
        let existing = self
            .resolve(category_id, snapshot_id, operation)
            .await
            .map_err(JobRunError::Start)?;
        let meta = JobMeta {
            snapshot_id: existing.as_ref().map(|s| s.id.clone()),
            message: Some(operation.to_string()),
        };
        info!(category_id, snapshot_id = ?meta.snapshot_id, %operation, "operation starting");

        self.jobs
            .run_job(operation.kind(), category_id, meta, |ctx| async move {
                let snapshot = match existing {
                    Some(snapshot) => snapshot,
                    None => {
                        let drafted = self.snapshots.resolve_or_draft(category_id, None).await?;
                        self.jobs.attach_snapshot(ctx.job_id, &drafted.id).await?;
                        drafted
                    }
                };
                self.execute(category_id, &snapshot.id, operation, &ctx).await
            })
            .await
    }

    async fn execute(
        &self,
        category_id: &str,
        snapshot_id: &str,
        operation: Operation,
        ctx: &JobContext,
    ) -> Result<OperationOutcome, PipelineError> {
        match operation {
            Operation::Grow {
                target_valid,
                max_attempts,
            } => {
                let mut params = GrowthParams::new(category_id, snapshot_id, &self.growth);
                if let Some(target) = target_valid {
                    params = params.with_target(target);
                }
                if let Some(attempts) = max_attempts {
                    params = params.with_max_attempts(attempts);
                }
                Ok(OperationOutcome::Grown(self.engine.grow(&params, ctx).await?))
            }
            Operation::Validate => Ok(OperationOutcome::Validated(
                self.engine.validate_pending(category_id, snapshot_id, ctx).await?,
            )),
            Operation::Certify { tier, policy } => Ok(OperationOutcome::Certified(
                self.certification.certify(snapshot_id, tier, policy).await?,
            )),
            Operation::Rebuild { tier } => {
                self.snapshots.reset_for_rebuild(snapshot_id).await?;
                let target = match tier {
                    CertificationTier::Full => self.growth.rebuild_target_full,
                    CertificationTier::Lite => self.growth.rebuild_target_lite,
                };
                let params = GrowthParams::new(category_id, snapshot_id, &self.growth).with_target(target);
                let growth = self.engine.grow(&params, ctx).await?;
                let certification = self
                    .certification
                    .certify(snapshot_id, tier, CertificationPolicy::LeanRebuild)
                    .await?;
                Ok(OperationOutcome::Rebuilt { growth, certification })
            }
        }
    }

    /// Run one operation across categories, `category_concurrency` at a time.
    /// Results come back in input order.
    pub async fn run_many(
        &self,
        categories: Vec<String>,
        operation: Operation,
        cancel: &CancellationToken,
    ) -> Vec<(String, Option<PipelineResult>)> {
        let pool = TaskPool::new(self.growth.category_concurrency);
        let report = pool
            .run(categories.clone(), cancel, false, |category_id, _token| async move {
                Ok::<_, std::convert::Infallible>(self.run(&category_id, None, operation).await)
            })
            .await;
        categories
            .into_iter()
            .zip(report.items)
            .map(|(category_id, item)| {
                let result = match item {
                    PoolItem::Completed(result) => Some(result),
                    PoolItem::Failed(never) => match never {},
                    PoolItem::Skipped => None,
                };
                (category_id, result)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kinds() {
        let grow = Operation::Grow {
            target_valid: None,
            max_attempts: None,
        };
        assert_eq!(grow.kind(), JobKind::Grow);
        assert!(grow.may_draft());
        let certify = Operation::Certify {
            tier: CertificationTier::Full,
            policy: CertificationPolicy::Standard,
        };
        assert_eq!(certify.kind(), JobKind::Certify);
        assert!(!certify.may_draft());
        assert_eq!(Operation::Validate.to_string(), "validate");
    }

    #[test]
    fn test_growth_stop_is_pipeline_stop() {
        let err = PipelineError::from(GrowthError::Stopped(uuid::Uuid::nil()));
        assert!(err.is_stop());
        assert!(!PipelineError::from(DomainError::UnknownCategory("x".into())).is_stop());
    }
}
