//! Corpus commands: draft, grow, validate, certify, rebuild, reset, status.

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::context::AppContext;
use crate::cli::output::{list_table, output, percent, render_list, truncate, CommandOutput};
use crate::cli::types::{Commands, TargetArgs};
use crate::domain::models::{CertificationPolicy, CertificationTier, CertificationVerdict, Snapshot};
use crate::services::growth_engine::{GrowthReport, GrowthStatus, PlateauReason, ValidationReport};
use crate::services::pipeline::PipelineResult;
use crate::services::snapshot_service::SnapshotStatus;
use crate::services::{Operation, OperationOutcome, Pipeline};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// A snapshot as shown to operators
#[derive(Debug, Serialize)]
pub struct SnapshotOutput {
    /// Snapshot id
    pub id: String,
    /// Category id
    pub category_id: String,
    /// Market as category/country/language
    pub market: String,
    /// Lifecycle stage
    pub lifecycle: String,
    /// Anchor count
    pub anchors: usize,
    /// Rows at the last recompute
    pub total: u64,
    /// Valid rows at the last recompute
    pub valid: u64,
    /// Zero rows at the last recompute
    pub zero: u64,
    /// Last write time, RFC 3339
    pub updated_at: String,
}

impl From<&Snapshot> for SnapshotOutput {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            category_id: snapshot.category_id.clone(),
            market: format!("{}/{}", snapshot.country, snapshot.language),
            lifecycle: snapshot.lifecycle.as_str().to_string(),
            anchors: snapshot.anchors.len(),
            total: snapshot.stats.total,
            valid: snapshot.stats.valid,
            zero: snapshot.stats.zero,
            updated_at: snapshot.updated_at.to_rfc3339(),
        }
    }
}

/// Result of a snapshot-changing command
#[derive(Debug, Serialize)]
pub struct SnapshotActionOutput {
    /// What happened
    pub message: String,
    /// Snapshot afterwards
    pub snapshot: SnapshotOutput,
}

impl CommandOutput for SnapshotActionOutput {
    fn to_human(&self) -> String {
        format!(
            "{}\n  lifecycle: {}  anchors: {}  keywords: {}",
            self.message, self.snapshot.lifecycle, self.snapshot.anchors, self.snapshot.total
        )
    }
}

/// Snapshots of one category
#[derive(Debug, Serialize)]
pub struct SnapshotListOutput {
    /// Snapshots, newest first
    pub snapshots: Vec<SnapshotOutput>,
    /// Id of the active snapshot, if any
    pub active: Option<String>,
}

impl CommandOutput for SnapshotListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["", "id", "lifecycle", "valid", "total", "updated"]);
        for s in &self.snapshots {
            let marker = if self.active.as_deref() == Some(s.id.as_str()) { "*" } else { "" };
            table.add_row(vec![
                marker.to_string(),
                s.id.clone(),
                s.lifecycle.clone(),
                s.valid.to_string(),
                s.total.to_string(),
                truncate(&s.updated_at, 19),
            ]);
        }
        render_list("snapshot", &table, self.snapshots.len())
    }
}

/// Snapshot status report
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct StatusOutput(pub SnapshotStatus);

impl CommandOutput for StatusOutput {
    fn to_human(&self) -> String {
        let status = &self.0;
        let s = &status.snapshot;
        let c = &status.counts;
        let h = &status.health;
        let mut lines = vec![
            format!("Snapshot: {}{}", s.id, if status.active { " (active)" } else { "" }),
            format!("Category: {} ({}/{})", s.category_id, s.country, s.language),
            format!("Lifecycle: {}", s.lifecycle),
            format!(
                "Keywords: {} total, {} valid ({}), {} zero, {} unverified",
                c.total,
                c.valid,
                percent(c.valid, c.total),
                c.zero,
                c.unverified
            ),
            format!(
                "Health: {} (score {:.1}), p50 {}, p90 {}, top-10 share {:.1}%, action {:?}",
                h.grade.as_str(),
                h.score,
                h.p50,
                h.p90,
                h.top10_share_pct,
                h.action
            ),
        ];
        if let Some(record) = &s.certification {
            lines.push(format!(
                "Last certification: {} {} under {} at {}",
                if record.pass { "PASS" } else { "BLOCKED" },
                record.awarded_tier.unwrap_or(record.requested_tier),
                record.policy.as_str(),
                record.checked_at.to_rfc3339()
            ));
            for reason in &record.reasons {
                lines.push(format!("  - {reason}"));
            }
        }
        for warning in &h.warnings {
            lines.push(format!("Warning: {warning}"));
        }
        lines.join("\n")
    }
}

fn growth_status(status: GrowthStatus) -> &'static str {
    match status {
        GrowthStatus::Success => "target reached",
        GrowthStatus::Plateau(PlateauReason::NoCandidates) => "plateau (no candidates)",
        GrowthStatus::Plateau(PlateauReason::AttemptsExhausted) => "plateau (attempts exhausted)",
    }
}

fn render_growth(report: &GrowthReport) -> String {
    let mut table = list_table(&["pass", "candidates", "discovered", "resolved", "pruned", "valid", "total"]);
    for pass in &report.history {
        table.add_row(vec![
            pass.pass.to_string(),
            pass.candidates.to_string(),
            pass.discovered.to_string(),
            pass.validation.resolved.to_string(),
            pass.pruned.to_string(),
            pass.after.valid.to_string(),
            pass.after.total.to_string(),
        ]);
    }
    format!(
        "Growth {} for {} ({}): {}/{} valid, {} total, {} unverified, lifecycle {}\n{}",
        growth_status(report.status),
        report.category_id,
        report.snapshot_id,
        report.counts.valid,
        report.target_valid,
        report.counts.total,
        report.counts.unverified,
        report.lifecycle,
        table
    )
}

fn render_validation(report: &ValidationReport) -> String {
    format!(
        "Validated {} ({}): {} batches, {} resolved, {} without data, {} pruned; {} valid of {}, lifecycle {}",
        report.category_id,
        report.snapshot_id,
        report.validation.batches,
        report.validation.resolved,
        report.validation.missing,
        report.pruned,
        report.counts.valid,
        report.counts.total,
        report.lifecycle
    )
}

fn render_verdict(snapshot_id: &str, verdict: &CertificationVerdict) -> String {
    let mut table = list_table(&["gate", "tier", "result", "detail"]);
    for gate in &verdict.gates {
        table.add_row(vec![
            gate.gate.label().to_string(),
            gate.tier.to_string(),
            if gate.passed { "pass" } else { "FAIL" }.to_string(),
            gate.detail.clone(),
        ]);
    }
    let headline = if verdict.pass {
        format!(
            "{snapshot_id} certified {} ({} policy), lifecycle {}",
            verdict.awarded_tier.unwrap_or(verdict.requested_tier),
            verdict.policy.as_str(),
            verdict.lifecycle
        )
    } else {
        format!(
            "{snapshot_id} blocked for {} ({} policy): {}",
            verdict.requested_tier,
            verdict.policy.as_str(),
            verdict.reason_summary()
        )
    };
    format!("{headline}\n{table}")
}

fn render_outcome(outcome: &OperationOutcome) -> String {
    match outcome {
        OperationOutcome::Grown(report) => render_growth(report),
        OperationOutcome::Validated(report) => render_validation(report),
        OperationOutcome::Certified(outcome) => render_verdict(&outcome.snapshot_id, &outcome.verdict),
        OperationOutcome::Rebuilt { growth, certification } => format!(
            "{}\n{}",
            render_growth(growth),
            render_verdict(&certification.snapshot_id, &certification.verdict)
        ),
    }
}

/// Result of a single-category operation
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct OperationOutput(pub OperationOutcome);

impl CommandOutput for OperationOutput {
    fn to_human(&self) -> String {
        render_outcome(&self.0)
    }
}

/// Certification verdict, applied or previewed
#[derive(Debug, Serialize)]
pub struct VerdictOutput {
    /// Snapshot evaluated
    pub snapshot_id: String,
    /// True when nothing was written
    pub dry_run: bool,
    /// The verdict
    pub verdict: CertificationVerdict,
}

impl CommandOutput for VerdictOutput {
    fn to_human(&self) -> String {
        format!("(dry run) {}", render_verdict(&self.snapshot_id, &self.verdict))
    }
}

/// Result for one category of a multi-category run
#[derive(Debug, Serialize)]
pub struct CategoryResult {
    /// Category id
    pub category_id: String,
    /// Outcome when the operation finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OperationOutcome>,
    /// Error when it did not
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the run was cancelled before this category started
    pub skipped: bool,
}

/// Results of a multi-category run
#[derive(Debug, Serialize)]
pub struct BatchOutput {
    /// Operation that ran
    pub operation: String,
    /// One entry per category, in input order
    pub results: Vec<CategoryResult>,
}

impl BatchOutput {
    fn failures(&self) -> usize {
        self.results.iter().filter(|r| r.error.is_some()).count()
    }
}

impl CommandOutput for BatchOutput {
    fn to_human(&self) -> String {
        let mut blocks = vec![format!("{} across {} categories", self.operation, self.results.len())];
        for result in &self.results {
            let body = match (&result.outcome, &result.error) {
                (Some(outcome), _) => render_outcome(outcome),
                (None, Some(error)) => format!("{}: failed: {error}", result.category_id),
                (None, None) => format!("{}: skipped", result.category_id),
            };
            blocks.push(body);
        }
        blocks.join("\n\n")
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn parse_tier(tier: &str) -> Result<CertificationTier> {
    CertificationTier::from_str(tier).ok_or_else(|| anyhow!("Invalid tier: {tier} (expected full or lite)"))
}

fn parse_policy(policy: &str) -> Result<CertificationPolicy> {
    CertificationPolicy::from_str(policy)
        .ok_or_else(|| anyhow!("Invalid policy: {policy} (expected standard or lean-rebuild)"))
}

/// Categories named by `target`, checked against the configured dictionaries.
fn categories(pipeline: &Pipeline, target: &TargetArgs) -> Result<Vec<String>> {
    let categories = if target.all {
        pipeline.snapshots().category_ids()
    } else {
        target.categories.clone()
    };
    if categories.is_empty() {
        bail!("No categories given; name one or pass --all");
    }
    if target.snapshot.is_some() && categories.len() > 1 {
        bail!("--snapshot applies to a single category");
    }
    for category in &categories {
        pipeline.snapshots().dictionary(category)?;
    }
    Ok(categories)
}

/// Ask the active jobs of `categories` to stop, once Ctrl-C arrives.
async fn stop_on_interrupt(pipeline: &Pipeline, categories: &[String]) {
    if tokio::signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    warn!("interrupt received; stopping active jobs");
    for category in categories {
        match pipeline.jobs().get_active_job_for_category(category).await {
            Ok(Some(job)) => {
                if let Err(e) = pipeline.jobs().request_stop(job.id).await {
                    warn!(job_id = %job.id, error = %e, "could not request stop");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(category_id = %category, error = %e, "could not look up active job"),
        }
    }
}

/// Drive `work` to completion; an interrupt requests a stop and keeps waiting
/// so the job is finalized as STOPPED.
async fn with_interrupt<T>(pipeline: &Pipeline, categories: &[String], work: impl Future<Output = T>) -> T {
    tokio::pin!(work);
    tokio::select! {
        result = &mut work => result,
        () = stop_on_interrupt(pipeline, categories) => work.await,
    }
}

async fn run_operation(pipeline: &Pipeline, target: &TargetArgs, operation: Operation, json_mode: bool) -> Result<()> {
    let categories = categories(pipeline, target)?;

    if let [category] = categories.as_slice() {
        let result = with_interrupt(
            pipeline,
            &categories,
            pipeline.run(category, target.snapshot.as_deref(), operation),
        )
        .await;
        let outcome = result.with_context(|| format!("{operation} failed for {category}"))?;
        output(&OperationOutput(outcome), json_mode);
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let results = with_interrupt(pipeline, &categories, async {
        let results = pipeline.run_many(categories.clone(), operation, &cancel).await;
        cancel.cancel();
        results
    })
    .await;
    let out = BatchOutput {
        operation: operation.to_string(),
        results: results.into_iter().map(category_result).collect(),
    };
    output(&out, json_mode);
    let failures = out.failures();
    if failures > 0 {
        bail!("{operation} failed for {failures} categor{}", if failures == 1 { "y" } else { "ies" });
    }
    Ok(())
}

fn category_result((category_id, result): (String, Option<PipelineResult>)) -> CategoryResult {
    match result {
        Some(Ok(outcome)) => CategoryResult {
            category_id,
            outcome: Some(outcome),
            error: None,
            skipped: false,
        },
        Some(Err(e)) => CategoryResult {
            category_id,
            outcome: None,
            error: Some(e.to_string()),
            skipped: false,
        },
        None => CategoryResult {
            category_id,
            outcome: None,
            error: None,
            skipped: true,
        },
    }
}

async fn target_snapshot(pipeline: &Pipeline, category: &str, snapshot: Option<&str>) -> Result<Snapshot> {
    pipeline.snapshots().dictionary(category)?;
    match snapshot {
        Some(id) => Ok(pipeline.snapshots().get(id).await?),
        None => pipeline
            .snapshots()
            .resolve_active(category)
            .await?
            .ok_or_else(|| anyhow!("No active snapshot for {category}; run `demand-corpus draft {category}`")),
    }
}

/// Run a corpus command
pub async fn execute(command: Commands, ctx: &AppContext, json_mode: bool) -> Result<()> {
    let pipeline = &ctx.pipeline;
    match command {
        Commands::Draft { category, activate } => {
            let snapshot = pipeline.snapshots().draft_snapshot(&category, activate).await?;
            let active = pipeline
                .snapshots()
                .resolve_active(&category)
                .await?
                .is_some_and(|s| s.id == snapshot.id);
            let out = SnapshotActionOutput {
                message: format!(
                    "Snapshot drafted: {}{}",
                    snapshot.id,
                    if active { " (active)" } else { "" }
                ),
                snapshot: SnapshotOutput::from(&snapshot),
            };
            output(&out, json_mode);
        }

        Commands::Grow {
            target,
            valid,
            max_attempts,
        } => {
            let operation = Operation::Grow {
                target_valid: valid,
                max_attempts,
            };
            run_operation(pipeline, &target, operation, json_mode).await?;
        }

        Commands::Validate { target } => {
            run_operation(pipeline, &target, Operation::Validate, json_mode).await?;
        }

        Commands::Certify {
            target,
            tier,
            policy,
            dry_run,
        } => {
            let tier = parse_tier(&tier)?;
            let policy = parse_policy(&policy)?;
            if dry_run {
                for category in categories(pipeline, &target)? {
                    let snapshot = target_snapshot(pipeline, &category, target.snapshot.as_deref()).await?;
                    let verdict = pipeline.certification().preview(&snapshot.id, tier, policy).await?;
                    let out = VerdictOutput {
                        snapshot_id: snapshot.id,
                        dry_run: true,
                        verdict,
                    };
                    output(&out, json_mode);
                }
            } else {
                run_operation(pipeline, &target, Operation::Certify { tier, policy }, json_mode).await?;
            }
        }

        Commands::Rebuild { target, tier } => {
            let tier = parse_tier(&tier)?;
            run_operation(pipeline, &target, Operation::Rebuild { tier }, json_mode).await?;
        }

        Commands::Reset { category, snapshot } => {
            let snapshot = target_snapshot(pipeline, &category, snapshot.as_deref()).await?;
            if let Some(job) = pipeline.jobs().get_active_job_for_category(&category).await? {
                bail!("{category} has an active {} job ({}); stop it first", job.kind, job.id);
            }
            let from = snapshot.lifecycle;
            let snapshot = pipeline.snapshots().reset_for_rebuild(&snapshot.id).await?;
            let out = SnapshotActionOutput {
                message: format!("Snapshot {} reset: {from} -> {}", snapshot.id, snapshot.lifecycle),
                snapshot: SnapshotOutput::from(&snapshot),
            };
            output(&out, json_mode);
        }

        Commands::Status { category, snapshot, all } => {
            if all {
                pipeline.snapshots().dictionary(&category)?;
                let snapshots = pipeline.snapshots().list(&category).await?;
                let active = pipeline.snapshots().resolve_active(&category).await?.map(|s| s.id);
                let out = SnapshotListOutput {
                    snapshots: snapshots.iter().map(SnapshotOutput::from).collect(),
                    active,
                };
                output(&out, json_mode);
            } else {
                let snapshot = target_snapshot(pipeline, &category, snapshot.as_deref()).await?;
                let status = pipeline.snapshots().status(&snapshot.id).await?;
                output(&StatusOutput(status), json_mode);
            }
        }

        Commands::Job(_) => bail!("job commands are not corpus commands"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_and_policy_parsing() {
        assert_eq!(parse_tier("lite").unwrap(), CertificationTier::Lite);
        assert!(parse_tier("gold").is_err());
        assert_eq!(parse_policy("lean-rebuild").unwrap(), CertificationPolicy::LeanRebuild);
        assert!(parse_policy("strict").is_err());
    }

    #[test]
    fn test_skipped_category_result() {
        let result = category_result(("shaving".to_string(), None));
        assert!(result.skipped);
        assert!(result.outcome.is_none() && result.error.is_none());
    }
}
