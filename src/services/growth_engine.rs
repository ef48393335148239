//! Growth engine: the corpus convergence loop.
//!
//! Each pass runs, in order:
//!
//! - **GENERATE** -- template candidates for anchors below target, plus
//!   related-keyword discovery in early passes when templates run thin.
//! - **PERSIST** -- new rows are written as UNVERIFIED before any lookup.
//! - **VALIDATE** -- unverified rows go to the provider in batches, fanned
//!   out across anchors; every batch result is written back immediately.
//! - **PRUNE** -- rows without any positive signal become inactive ZERO rows.
//! - **RECOMPUTE** -- rows are re-read from the store, stats and lifecycle
//!   promotions are written.
//!
//! The loop ends on success (target reached, nothing unverified), plateau
//! (nothing new to try, or the pass budget is spent) or a fatal stall (a pass
//! that should have moved the corpus but did not).

use chrono::Utc;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{
    CallError, CategoryDictionary, CorpusCounts, GrowthConfig, JobStatus, KeywordRow, Lifecycle,
    ProgressPatch, Snapshot,
};
use crate::domain::ports::{SnapshotStore, VolumeRecord};
use crate::services::anchor_assignment::assign_anchor;
use crate::services::candidate_generator::CandidateGenerator;
use crate::services::job_control::{JobContext, JobControl, JobError, JobExit, JobFailure, JobOutcome};
use crate::services::snapshot_service::is_growable;
use crate::services::task_pool::TaskPool;
use crate::services::volume_gate::{BatchVolumeClient, EmptyBatchGuard, EmptyResults};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a growth or validation run ended without a report
#[derive(Debug, Error)]
pub enum GrowthError {
    /// The job was stop-requested
    #[error("job {0} was stopped")]
    Stopped(Uuid),

    /// The job was finalized elsewhere while work ran
    #[error("job {job_id} was finalized as {status} while work was running")]
    Finalized {
        /// Job that was finalized
        job_id: Uuid,
        /// Status it was finalized with
        status: JobStatus,
    },

    #[error(
        "growth stalled on pass {pass}: {candidates} new candidates but valid={valid}, total={total}, unverified={unverified} did not move"
    )]
    /// A pass added candidates but the corpus did not move
    Stalled {
        /// Pass that stalled
        pass: u32,
        /// Candidates the pass added
        candidates: usize,
        /// Valid rows after the pass
        valid: u64,
        /// Rows after the pass
        total: u64,
        /// Unverified rows after the pass
        unverified: u64,
    },

    /// The provider answered with nothing too many times in a row
    #[error(transparent)]
    EmptyResults(#[from] EmptyResults),

    /// A provider call failed terminally
    #[error("provider call failed: {0}")]
    Provider(CallError),

    /// Storage or job register failure
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<JobError> for GrowthError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Stopped(job_id) => Self::Stopped(job_id),
            JobError::Finalized { job_id, status } => Self::Finalized { job_id, status },
            JobError::Domain(e) => Self::Domain(e),
        }
    }
}

impl JobFailure for GrowthError {
    fn is_stop(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

// ---------------------------------------------------------------------------
// Parameters and reports
// ---------------------------------------------------------------------------

/// Inputs for one growth run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrowthParams {
    /// Category being grown
    pub category_id: String,
    /// Snapshot being grown
    pub snapshot_id: String,
    /// Valid rows to reach
    pub target_valid: u64,
    /// Pass budget
    pub max_attempts: u32,
}

impl GrowthParams {
    /// Parameters with the configured target and pass budget
    pub fn new(category_id: impl Into<String>, snapshot_id: impl Into<String>, config: &GrowthConfig) -> Self {
        Self {
            category_id: category_id.into(),
            snapshot_id: snapshot_id.into(),
            target_valid: config.default_target_valid,
            max_attempts: config.max_attempts,
        }
    }

    /// Override the valid target
    #[must_use]
    pub const fn with_target(mut self, target_valid: u64) -> Self {
        self.target_valid = target_valid;
        self
    }

    /// Override the pass budget
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// Why a run plateaued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateauReason {
    /// No new candidates and nothing left to validate
    NoCandidates,
    /// Pass budget spent before the target was reached
    AttemptsExhausted,
}

/// How a growth run finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum GrowthStatus {
    /// Target reached with nothing left unverified
    Success,
    /// Stopped early without failing
    Plateau(PlateauReason),
}

/// Counters for one validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ValidationStats {
    /// Batches sent to the provider
    pub batches: u64,
    /// Rows that received a volume
    pub resolved: u64,
    /// Keywords the provider had no data for; they stay UNVERIFIED
    pub missing: u64,
}

/// What one pass did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassReport {
    /// Pass number, 1-based
    pub pass: u32,
    /// Template candidates added
    pub candidates: usize,
    /// Discovered terms added
    pub discovered: usize,
    /// Validation counters for the pass
    pub validation: ValidationStats,
    /// Rows pruned to inactive
    pub pruned: usize,
    /// Counts when the pass began
    pub before: CorpusCounts,
    /// Counts after recompute
    pub after: CorpusCounts,
}

/// Result of a growth run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthReport {
    /// Category that was grown
    pub category_id: String,
    /// Snapshot that was grown
    pub snapshot_id: String,
    /// How the run finished
    pub status: GrowthStatus,
    /// Valid rows the run aimed for
    pub target_valid: u64,
    /// Passes completed
    pub passes: u32,
    /// Final row counts
    pub counts: CorpusCounts,
    /// Lifecycle after the last recompute
    pub lifecycle: Lifecycle,
    /// Per-pass reports
    pub history: Vec<PassReport>,
}

impl JobOutcome for GrowthReport {
    fn job_exit(&self) -> JobExit {
        let status = match self.status {
            GrowthStatus::Success => "target reached".to_string(),
            GrowthStatus::Plateau(PlateauReason::NoCandidates) => "plateau: no new candidates".to_string(),
            GrowthStatus::Plateau(PlateauReason::AttemptsExhausted) => {
                format!("plateau: {} passes used", self.passes)
            }
        };
        JobExit::Completed(format!(
            "grow {}: {} valid / {} total after {} passes ({status})",
            self.snapshot_id, self.counts.valid, self.counts.total, self.passes
        ))
    }
}

/// Result of validating pending rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Category that was validated
    pub category_id: String,
    /// Snapshot that was validated
    pub snapshot_id: String,
    /// Validation counters
    pub validation: ValidationStats,
    /// Rows pruned to inactive
    pub pruned: usize,
    /// Final row counts
    pub counts: CorpusCounts,
    /// Lifecycle after recompute
    pub lifecycle: Lifecycle,
}

impl JobOutcome for ValidationReport {
    fn job_exit(&self) -> JobExit {
        JobExit::Completed(format!(
            "validate {}: {} resolved in {} batches, {} still unverified",
            self.snapshot_id, self.validation.resolved, self.validation.batches, self.counts.unverified
        ))
    }
}

/// A pass is stalled when it added candidates yet neither the valid count
/// nor the row count moved and nothing is left unverified: the new rows
/// vanished. Rows the provider keeps omitting are not a stall; they stay
/// UNVERIFIED until the pass budget runs out or the empty-batch guard trips.
pub const fn is_stalled(before: &CorpusCounts, after: &CorpusCounts, candidates: usize) -> bool {
    candidates > 0 && after.valid == before.valid && after.total == before.total && after.unverified == 0
}

struct ValidationState<'g> {
    rows: Vec<KeywordRow>,
    guard: &'g mut EmptyBatchGuard,
    stats: ValidationStats,
}

// ---------------------------------------------------------------------------
// GrowthEngine
// ---------------------------------------------------------------------------

/// Runs the convergence loop and standalone validation
pub struct GrowthEngine {
    store: Arc<dyn SnapshotStore>,
    client: Arc<BatchVolumeClient>,
    jobs: Arc<JobControl>,
    categories: BTreeMap<String, CategoryDictionary>,
    config: GrowthConfig,
    pool: TaskPool,
}

impl GrowthEngine {
    /// An engine over the given store, provider client and job register
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        client: Arc<BatchVolumeClient>,
        jobs: Arc<JobControl>,
        categories: BTreeMap<String, CategoryDictionary>,
        config: GrowthConfig,
    ) -> Self {
        Self {
            pool: TaskPool::new(config.anchor_concurrency),
            store,
            client,
            jobs,
            categories,
            config,
        }
    }

    /// Growth settings in use
    pub const fn config(&self) -> &GrowthConfig {
        &self.config
    }

    async fn checkpoint(&self, ctx: &JobContext) -> Result<(), GrowthError> {
        if ctx.cancel.is_cancelled() {
            return Err(GrowthError::Stopped(ctx.job_id));
        }
        self.jobs.assert_not_stopped(ctx.job_id).await?;
        Ok(())
    }

    fn call_failed(err: CallError, ctx: &JobContext) -> GrowthError {
        if err.is_cancelled() {
            GrowthError::Stopped(ctx.job_id)
        } else {
            GrowthError::Provider(err)
        }
    }

    async fn load(&self, snapshot_id: &str, operation: &str) -> Result<Snapshot, GrowthError> {
        let snapshot = self
            .store
            .get_snapshot_by_id(snapshot_id)
            .await?
            .ok_or_else(|| DomainError::SnapshotNotFound(snapshot_id.to_string()))?;
        if !is_growable(snapshot.lifecycle) {
            warn!(snapshot_id = %snapshot.id, lifecycle = %snapshot.lifecycle, operation, "blocked by lifecycle guard");
            return Err(DomainError::LifecycleGuard {
                snapshot_id: snapshot.id.clone(),
                lifecycle: snapshot.lifecycle.to_string(),
                operation: operation.to_string(),
            }
            .into());
        }
        Ok(snapshot)
    }

    /// Grow a snapshot until it converges, plateaus or stalls.
    pub async fn grow(&self, params: &GrowthParams, ctx: &JobContext) -> Result<GrowthReport, GrowthError> {
        let dictionary = self
            .categories
            .get(&params.category_id)
            .ok_or_else(|| DomainError::UnknownCategory(params.category_id.clone()))?;
        let mut snapshot = self.load(&params.snapshot_id, "grow").await?;
        if snapshot.anchors.is_empty() && snapshot.ensure_anchor(&params.category_id) {
            self.store.write_snapshot(&snapshot).await?;
        }
        let generator = CandidateGenerator::new(dictionary.clone(), self.config.clone());
        let mut rows = self.store.read_all_keyword_rows(&snapshot.id).await?;
        let max_attempts = params.max_attempts.max(1);
        // empty batches count across passes, not just within one
        let mut empty_guard = EmptyBatchGuard::new(self.config.empty_batch_limit);
        let mut history = Vec::new();
        let mut status = None;

        info!(
            job_id = %ctx.job_id,
            category_id = %params.category_id,
            snapshot_id = %snapshot.id,
            target = params.target_valid,
            rows = rows.len(),
            "growth started"
        );

        for pass in 1..=max_attempts {
            self.checkpoint(ctx).await?;
            self.jobs
                .update_progress(
                    ctx.job_id,
                    ProgressPatch::message(format!("grow pass {pass}/{max_attempts}"))
                        .counts(u64::from(pass - 1), u64::from(max_attempts)),
                )
                .await?;

            let before = CorpusCounts::from_rows(&rows);
            if before.valid >= params.target_valid && before.unverified == 0 {
                status = Some(GrowthStatus::Success);
                break;
            }

            // GENERATE
            let candidates = generator.generate(&snapshot.anchors, &rows);
            let discovered = if candidates.len() < self.config.discovery_min_candidates
                && pass <= self.config.discovery_passes
            {
                self.checkpoint(ctx).await?;
                self.discover(&generator, &snapshot, &rows, &candidates, pass, ctx).await?
            } else {
                Vec::new()
            };
            let new_count = candidates.len() + discovered.len();
            debug!(pass, candidates = candidates.len(), discovered = discovered.len(), "candidates generated");

            if new_count == 0 && before.unverified == 0 {
                info!(pass, valid = before.valid, "no new candidates and nothing pending");
                status = Some(GrowthStatus::Plateau(PlateauReason::NoCandidates));
                break;
            }

            // PERSIST
            if new_count > 0 {
                let now = Utc::now();
                let new_rows = candidates
                    .iter()
                    .map(|text| (text.as_str(), None))
                    .chain(discovered.iter().map(|r| (r.keyword.as_str(), Some(r.volume))))
                    .map(|(text, secondary)| {
                        let anchor = assign_anchor(text, &snapshot.anchors)
                            .map_or_else(|| params.category_id.clone(), |a| a.anchor_id);
                        KeywordRow::unverified(text, anchor, &params.category_id, now).with_secondary_volume(secondary)
                    });
                let mut seen: HashSet<String> = rows.iter().map(|r| r.id.clone()).collect();
                rows.extend(new_rows.filter(|r| seen.insert(r.id.clone())));
                self.checkpoint(ctx).await?;
                self.store.write_keyword_rows(&snapshot.id, &rows).await?;
            }

            // VALIDATE
            self.checkpoint(ctx).await?;
            let (validated, validation) = self.validate_rows(&snapshot, rows, &mut empty_guard, ctx).await?;
            rows = validated;

            // PRUNE
            let pruned = rows.iter_mut().map(KeywordRow::prune).filter(|changed| *changed).count();

            // RECOMPUTE
            self.store.write_keyword_rows(&snapshot.id, &rows).await?;
            rows = self.store.read_all_keyword_rows(&snapshot.id).await?;
            let after = CorpusCounts::from_rows(&rows);
            self.recompute(&mut snapshot, after).await?;

            info!(
                job_id = %ctx.job_id,
                category_id = %params.category_id,
                snapshot_id = %snapshot.id,
                pass,
                candidates = new_count,
                resolved = validation.resolved,
                missing = validation.missing,
                pruned,
                valid = after.valid,
                total = after.total,
                unverified = after.unverified,
                "pass complete"
            );

            if is_stalled(&before, &after, new_count) {
                warn!(pass, valid = after.valid, total = after.total, "growth stalled");
                return Err(GrowthError::Stalled {
                    pass,
                    candidates: new_count,
                    valid: after.valid,
                    total: after.total,
                    unverified: after.unverified,
                });
            }
            if after.valid == before.valid && new_count > 0 {
                warn!(pass, "candidates added but valid count did not increase");
            }

            history.push(PassReport {
                pass,
                candidates: candidates.len(),
                discovered: discovered.len(),
                validation,
                pruned,
                before,
                after,
            });
            self.jobs
                .update_progress(
                    ctx.job_id,
                    ProgressPatch::message(format!("pass {pass}: {} valid / {} total", after.valid, after.total))
                        .counts(u64::from(pass), u64::from(max_attempts)),
                )
                .await?;

            if pass < max_attempts && self.config.pass_delay_ms > 0 {
                tokio::select! {
                    () = ctx.cancel.cancelled() => return Err(GrowthError::Stopped(ctx.job_id)),
                    () = tokio::time::sleep(Duration::from_millis(self.config.pass_delay_ms)) => {}
                }
            }
        }

        let counts = CorpusCounts::from_rows(&rows);
        let status = status.unwrap_or(if counts.valid >= params.target_valid && counts.unverified == 0 {
            GrowthStatus::Success
        } else {
            GrowthStatus::Plateau(PlateauReason::AttemptsExhausted)
        });
        info!(
            job_id = %ctx.job_id,
            category_id = %params.category_id,
            snapshot_id = %snapshot.id,
            ?status,
            valid = counts.valid,
            passes = history.len(),
            "growth finished"
        );

        Ok(GrowthReport {
            category_id: params.category_id.clone(),
            snapshot_id: snapshot.id.clone(),
            status,
            target_valid: params.target_valid,
            passes: u32::try_from(history.len()).unwrap_or(u32::MAX),
            counts,
            lifecycle: snapshot.lifecycle,
            history,
        })
    }

    /// Validate whatever is pending without generating anything new.
    pub async fn validate_pending(
        &self,
        category_id: &str,
        snapshot_id: &str,
        ctx: &JobContext,
    ) -> Result<ValidationReport, GrowthError> {
        let mut snapshot = self.load(snapshot_id, "validate").await?;
        self.checkpoint(ctx).await?;
        let rows = self.store.read_all_keyword_rows(&snapshot.id).await?;
        let mut empty_guard = EmptyBatchGuard::new(self.config.empty_batch_limit);
        let (mut rows, validation) = self.validate_rows(&snapshot, rows, &mut empty_guard, ctx).await?;
        let pruned = rows.iter_mut().map(KeywordRow::prune).filter(|changed| *changed).count();
        self.store.write_keyword_rows(&snapshot.id, &rows).await?;
        let rows = self.store.read_all_keyword_rows(&snapshot.id).await?;
        let counts = CorpusCounts::from_rows(&rows);
        self.recompute(&mut snapshot, counts).await?;

        Ok(ValidationReport {
            category_id: category_id.to_string(),
            snapshot_id: snapshot.id.clone(),
            validation,
            pruned,
            counts,
            lifecycle: snapshot.lifecycle,
        })
    }

    async fn recompute(&self, snapshot: &mut Snapshot, counts: CorpusCounts) -> Result<(), GrowthError> {
        snapshot.apply_counts(counts, Utc::now());
        if counts.total > 0 {
            snapshot.promote(Lifecycle::Hydrated);
            if counts.unverified == 0 {
                snapshot.promote(Lifecycle::Validated);
                if counts.valid >= self.config.lite_promotion_valid {
                    snapshot.promote(Lifecycle::ValidatedLite);
                }
            }
        }
        self.store.write_snapshot(snapshot).await?;
        Ok(())
    }

    /// Related-keyword discovery. Provider failures other than cancellation
    /// are logged and leave the pass with template candidates only.
    async fn discover(
        &self,
        generator: &CandidateGenerator,
        snapshot: &Snapshot,
        rows: &[KeywordRow],
        taken: &[String],
        pass: u32,
        ctx: &JobContext,
    ) -> Result<Vec<VolumeRecord>, GrowthError> {
        let seeds = generator.discovery_seeds_for_pass(pass);
        if seeds.is_empty() {
            return Ok(Vec::new());
        }
        match self
            .client
            .discover_related(&snapshot.category_id, &snapshot.id, &seeds, &ctx.cancel)
            .await
        {
            Ok(found) => {
                let total = found.len();
                let kept = generator.filter_discovered(found, rows, taken);
                info!(pass, seeds = seeds.len(), discovered = total, kept = kept.len(), "discovery finished");
                Ok(kept)
            }
            Err(e) if e.is_cancelled() => Err(GrowthError::Stopped(ctx.job_id)),
            Err(e) => {
                warn!(pass, error = %e, "discovery failed; continuing with templates");
                Ok(Vec::new())
            }
        }
    }

    /// Send every UNVERIFIED row to the provider.
    ///
    /// Anchors are fanned out through the task pool; each anchor's batches run
    /// in order. Results are written after every batch. The first failure
    /// stops new batches from starting while in-flight ones drain.
    async fn validate_rows(
        &self,
        snapshot: &Snapshot,
        rows: Vec<KeywordRow>,
        empty_guard: &mut EmptyBatchGuard,
        ctx: &JobContext,
    ) -> Result<(Vec<KeywordRow>, ValidationStats), GrowthError> {
        let mut by_anchor: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, row) in rows.iter().enumerate() {
            if row.is_unverified() {
                by_anchor.entry(row.anchor_id.clone()).or_default().push(index);
            }
        }
        if by_anchor.is_empty() {
            return Ok((rows, ValidationStats::default()));
        }

        let batch_size = self.client.batch_size();
        let total_batches: u64 = by_anchor.values().map(|v| v.len().div_ceil(batch_size) as u64).sum();
        let state = Mutex::new(ValidationState {
            rows,
            guard: empty_guard,
            stats: ValidationStats::default(),
        });
        let shared = &state;
        let work: Vec<(String, Vec<usize>)> = by_anchor.into_iter().collect();

        let report = self
            .pool
            .run(work, &ctx.cancel, true, |(anchor_id, indices), pool_token| async move {
                for chunk in indices.chunks(batch_size) {
                    self.checkpoint(ctx).await?;
                    if pool_token.is_cancelled() {
                        debug!(anchor_id = %anchor_id, "validation cancelled; skipping remaining batches");
                        break;
                    }
                    let keywords: Vec<String> = {
                        let guard = shared.lock().await;
                        chunk.iter().map(|&i| guard.rows[i].text.clone()).collect()
                    };
                    let lookup = self
                        .client
                        .lookup_volumes(&snapshot.category_id, &snapshot.id, &keywords, &ctx.cancel)
                        .await
                        .map_err(|e| Self::call_failed(e, ctx))?;

                    let mut guard = shared.lock().await;
                    let state = &mut *guard;
                    state.guard.observe(lookup.is_empty())?;
                    let now = Utc::now();
                    for &i in chunk {
                        let row = &mut state.rows[i];
                        match lookup.resolved.get(&row.normalized_text()) {
                            Some(record) => {
                                row.record_volume(record.volume, record.cpc, record.competition_index, now);
                                state.stats.resolved += 1;
                            }
                            None => state.stats.missing += 1,
                        }
                    }
                    state.stats.batches += 1;
                    self.store.write_keyword_rows(&snapshot.id, &state.rows).await?;
                    let done = state.stats.batches;
                    drop(guard);

                    self.jobs
                        .update_progress(
                            ctx.job_id,
                            ProgressPatch::message(format!("validated batch {done}/{total_batches} ({anchor_id})"))
                                .counts(done, total_batches),
                        )
                        .await?;
                }
                Ok::<(), GrowthError>(())
            })
            .await;

        if let Some(err) = report.into_first_error() {
            return Err(err);
        }
        if ctx.cancel.is_cancelled() {
            return Err(GrowthError::Stopped(ctx.job_id));
        }
        let state = state.into_inner();
        Ok((state.rows, state.stats))
    }
}
