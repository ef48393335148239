//! Certification gate engine.
//!
//! `evaluate` is pure: it reads a snapshot and its rows and returns a verdict
//! listing every gate with its measured value. `CertificationService` applies
//! a verdict to the store. Lifecycle only moves up here; the rebuild reset is
//! the one way down.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    anchor_counts, CertificationConfig, CertificationMetrics, CertificationPolicy, CertificationRecord,
    CertificationTier, CertificationVerdict, CorpusCounts, GateId, GateResult, HealthGrade, KeywordRow,
    LeanThresholds, Snapshot, StandardThresholds,
};
use crate::domain::ports::SnapshotStore;
use crate::services::corpus_health::compute_health;
use crate::services::job_control::{JobExit, JobOutcome};

fn gate(gate: GateId, tier: CertificationTier, passed: bool, detail: String) -> GateResult {
    GateResult {
        gate,
        tier,
        passed,
        detail: format!("{}: {detail}", gate.label()),
    }
}

fn base_metrics(snapshot: &Snapshot, rows: &[KeywordRow]) -> CertificationMetrics {
    let counts = CorpusCounts::from_rows(rows);
    CertificationMetrics {
        total: counts.total,
        valid: counts.valid,
        zero: counts.zero,
        unverified: counts.unverified,
        coverage: counts.valid_ratio(),
        zero_ratio: counts.zero_ratio(),
        anchors_total: snapshot.anchors.len(),
        anchors_passing: 0,
        health_score: None,
        health_grade: None,
    }
}

fn standard_gates(
    snapshot: &Snapshot,
    rows: &[KeywordRow],
    tier: CertificationTier,
    t: &StandardThresholds,
    metrics: &mut CertificationMetrics,
) -> Vec<GateResult> {
    let passing = anchor_counts(rows, &snapshot.anchors)
        .values()
        .filter(|c| c.valid >= t.anchor_min_valid && c.max_volume >= t.anchor_min_head_volume)
        .count();
    metrics.anchors_passing = passing;

    let health = compute_health(snapshot, rows);
    metrics.health_score = Some(health.score);
    metrics.health_grade = Some(health.grade);

    vec![
        gate(
            GateId::Anchors,
            tier,
            passing >= t.min_anchors_passing,
            format!(
                "Found {passing} passing (need {}, valid>={}, head>={})",
                t.min_anchors_passing, t.anchor_min_valid, t.anchor_min_head_volume
            ),
        ),
        gate(
            GateId::Coverage,
            tier,
            metrics.coverage >= t.min_coverage,
            format!("{:.1}% (need {:.0}%)", metrics.coverage * 100.0, t.min_coverage * 100.0),
        ),
        gate(
            GateId::ZeroRatio,
            tier,
            metrics.zero_ratio <= t.max_zero_ratio,
            format!("{:.1}% (max {:.0}%)", metrics.zero_ratio * 100.0, t.max_zero_ratio * 100.0),
        ),
        gate(
            GateId::Health,
            tier,
            health.grade != HealthGrade::Red,
            format!("Grade is {} (score {:.1}, cannot be RED)", health.grade.as_str(), health.score),
        ),
        gate(
            GateId::ValidFloor,
            tier,
            metrics.valid >= t.min_valid,
            format!("{} valid keywords (need {})", metrics.valid, t.min_valid),
        ),
    ]
}

fn lean_gates(tier: CertificationTier, t: &LeanThresholds, metrics: &CertificationMetrics) -> Vec<GateResult> {
    let coverage_pct = metrics.coverage * 100.0;
    let zero_pct = metrics.zero_ratio * 100.0;
    vec![
        gate(
            GateId::Anchors,
            tier,
            metrics.anchors_passing >= t.min_anchors_passing,
            format!("Found {} passing (need {})", metrics.anchors_passing, t.min_anchors_passing),
        ),
        gate(
            GateId::Coverage,
            tier,
            coverage_pct >= t.min_coverage_pct,
            format!("{coverage_pct:.1}% (need {:.1}%)", t.min_coverage_pct),
        ),
        gate(
            GateId::ValidFloor,
            tier,
            metrics.valid >= t.min_valid,
            format!("{} valid keywords (need {})", metrics.valid, t.min_valid),
        ),
        gate(
            GateId::ZeroRatio,
            tier,
            zero_pct <= t.max_zero_pct,
            format!("{zero_pct:.1}% (max {:.1}%)", t.max_zero_pct),
        ),
    ]
}

fn failing(gates: &[GateResult], prefix: bool) -> Vec<String> {
    gates
        .iter()
        .filter(|g| !g.passed)
        .map(|g| {
            if prefix {
                format!("[{}] {}", g.tier, g.detail)
            } else {
                g.detail.clone()
            }
        })
        .collect()
}

/// Evaluate a snapshot against a policy and requested tier.
///
/// Pure and idempotent: re-evaluating unchanged rows gives the same verdict,
/// and the returned lifecycle is never below the snapshot's current one.
pub fn evaluate(
    snapshot: &Snapshot,
    rows: &[KeywordRow],
    tier: CertificationTier,
    policy: CertificationPolicy,
    config: &CertificationConfig,
) -> CertificationVerdict {
    let mut metrics = base_metrics(snapshot, rows);
    let mut gates = Vec::new();
    let mut reasons = Vec::new();
    let mut awarded = None;

    if metrics.valid == 0 {
        // poison: no thresholds can certify an empty corpus
        let poison = gate(GateId::Poison, tier, false, "0 valid keywords".to_string());
        reasons.push(poison.detail.clone());
        gates.push(poison);
    } else if policy == CertificationPolicy::Standard {
        let thresholds = match tier {
            CertificationTier::Full => &config.standard_full,
            CertificationTier::Lite => &config.standard_lite,
        };
        gates = standard_gates(snapshot, rows, tier, thresholds, &mut metrics);
        reasons = failing(&gates, false);
        if reasons.is_empty() {
            awarded = Some(tier);
        }
    } else {
        metrics.anchors_passing = anchor_counts(rows, &snapshot.anchors)
            .values()
            .filter(|c| c.valid >= config.lean_anchor_min_valid)
            .count();
        let ladder: Vec<(CertificationTier, &LeanThresholds)> = match tier {
            CertificationTier::Full => vec![
                (CertificationTier::Full, &config.lean_full),
                (CertificationTier::Lite, &config.lean_lite),
            ],
            CertificationTier::Lite => vec![(CertificationTier::Lite, &config.lean_lite)],
        };
        for (rung, thresholds) in &ladder {
            let rung_gates = lean_gates(*rung, thresholds, &metrics);
            let passed = rung_gates.iter().all(|g| g.passed);
            gates.extend(rung_gates);
            if passed {
                awarded = Some(*rung);
                break;
            }
        }
        if awarded.is_none() {
            reasons = failing(&gates, ladder.len() > 1);
        }
    }

    let lifecycle = awarded.map_or(snapshot.lifecycle, |t| snapshot.lifecycle.max(t.lifecycle()));
    CertificationVerdict {
        pass: awarded.is_some(),
        policy,
        requested_tier: tier,
        awarded_tier: awarded,
        lifecycle,
        reasons,
        gates,
        metrics,
    }
}

/// Result of a certification run.
#[derive(Debug, Clone, Serialize)]
pub struct CertificationOutcome {
    /// Snapshot that was evaluated
    pub snapshot_id: String,
    /// Verdict that was applied
    pub verdict: CertificationVerdict,
}

impl JobOutcome for CertificationOutcome {
    fn job_exit(&self) -> JobExit {
        if self.verdict.pass {
            JobExit::Completed(format!(
                "{} is {}: {}",
                self.snapshot_id,
                self.verdict.lifecycle,
                self.verdict.reason_summary()
            ))
        } else {
            JobExit::Failed(format!("certification blocked: {}", self.verdict.reason_summary()))
        }
    }
}

/// Applies verdicts to stored snapshots.
pub struct CertificationService {
    store: Arc<dyn SnapshotStore>,
    config: CertificationConfig,
}

impl CertificationService {
    /// A service writing to `store` with the given thresholds
    pub fn new(store: Arc<dyn SnapshotStore>, config: CertificationConfig) -> Self {
        Self { store, config }
    }

    /// Evaluate a stored snapshot without writing anything.
    pub async fn preview(
        &self,
        snapshot_id: &str,
        tier: CertificationTier,
        policy: CertificationPolicy,
    ) -> DomainResult<CertificationVerdict> {
        let snapshot = self
            .store
            .get_snapshot_by_id(snapshot_id)
            .await?
            .ok_or_else(|| DomainError::SnapshotNotFound(snapshot_id.to_string()))?;
        let rows = self.store.read_all_keyword_rows(snapshot_id).await?;
        Ok(evaluate(&snapshot, &rows, tier, policy, &self.config))
    }

    /// Evaluate and persist: the record is written whatever the verdict, the
    /// lifecycle and active pointer only on a pass.
    pub async fn certify(
        &self,
        snapshot_id: &str,
        tier: CertificationTier,
        policy: CertificationPolicy,
    ) -> DomainResult<CertificationOutcome> {
        let mut snapshot = self
            .store
            .get_snapshot_by_id(snapshot_id)
            .await?
            .ok_or_else(|| DomainError::SnapshotNotFound(snapshot_id.to_string()))?;
        let rows = self.store.read_all_keyword_rows(snapshot_id).await?;
        let verdict = evaluate(&snapshot, &rows, tier, policy, &self.config);

        let now = Utc::now();
        snapshot.apply_counts(CorpusCounts::from_rows(&rows), now);
        snapshot.promote(verdict.lifecycle);
        snapshot.certification = Some(CertificationRecord::from_verdict(&verdict, now));
        self.store.write_snapshot(&snapshot).await?;

        if verdict.pass {
            self.store.set_active_snapshot_id(&snapshot.key(), &snapshot.id).await?;
            info!(
                snapshot_id,
                category_id = %snapshot.category_id,
                lifecycle = %snapshot.lifecycle,
                policy = policy.as_str(),
                valid = verdict.metrics.valid,
                anchors_passing = verdict.metrics.anchors_passing,
                "snapshot certified"
            );
        } else {
            warn!(
                snapshot_id,
                category_id = %snapshot.category_id,
                policy = policy.as_str(),
                reasons = %verdict.reasons.join(" | "),
                "certification blocked"
            );
        }

        Ok(CertificationOutcome {
            snapshot_id: snapshot.id,
            verdict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Anchor, CorpusKey, Lifecycle};

    fn snapshot(anchors: usize) -> Snapshot {
        let anchors = (0..anchors).map(|i| Anchor::scan(format!("Anchor {i}"), i as u32)).collect();
        Snapshot::draft(&CorpusKey::new("shaving", "IN", "en"), anchors, Utc::now())
    }

    fn rows(anchor: &str, valid: usize, zero: usize, volume: u64) -> Vec<KeywordRow> {
        (0..valid + zero)
            .map(|i| {
                let mut r = KeywordRow::unverified(format!("{anchor} razor {i}"), anchor, "shaving", Utc::now());
                r.record_volume(if i < valid { volume } else { 0 }, None, None, Utc::now());
                r.prune();
                r
            })
            .collect()
    }

    fn config() -> CertificationConfig {
        CertificationConfig::default()
    }

    #[test]
    fn test_standard_reports_each_failing_gate() {
        let snap = snapshot(4);
        let rows = rows("Anchor 0", 5, 50, 100);
        let v = evaluate(&snap, &rows, CertificationTier::Full, CertificationPolicy::Standard, &config());
        assert!(!v.pass);
        assert_eq!(v.lifecycle, Lifecycle::Draft);
        assert_eq!(v.gates.len(), 5);
        assert!(v.reasons.iter().any(|r| r.starts_with("Gate A (Anchors): Found 0 passing (need 10")));
        assert!(v.reasons.iter().any(|r| r.starts_with("Gate B (Coverage)")));
        assert!(v.reasons.iter().any(|r| r.starts_with("Gate C (Zero Ratio)")));
        assert!(v.reasons.iter().any(|r| r.starts_with("Gate E (Valid Floor): 5 valid")));
    }

    #[test]
    fn test_standard_lite_passes() {
        let snap = snapshot(3);
        let mut all = Vec::new();
        for i in 0..3 {
            all.extend(rows(&format!("Anchor {i}"), 60, 10, 2_000));
        }
        let v = evaluate(&snap, &all, CertificationTier::Lite, CertificationPolicy::Standard, &config());
        assert!(v.pass, "{:?}", v.reasons);
        assert_eq!(v.awarded_tier, Some(CertificationTier::Lite));
        assert_eq!(v.lifecycle, Lifecycle::CertifiedLite);
        assert_eq!(v.metrics.anchors_passing, 3);
    }

    #[test]
    fn test_lean_poison_guard() {
        let snap = snapshot(2);
        let rows = rows("Anchor 0", 0, 40, 0);
        for tier in [CertificationTier::Full, CertificationTier::Lite] {
            let v = evaluate(&snap, &rows, tier, CertificationPolicy::LeanRebuild, &config());
            assert!(!v.pass);
            assert_eq!(v.reasons, vec!["POISON_GUARD: 0 valid keywords".to_string()]);
        }
    }

    #[test]
    fn test_standard_poison_guard_ignores_thresholds() {
        let snap = snapshot(1);
        let mut permissive = config();
        permissive.standard_lite = StandardThresholds {
            min_anchors_passing: 0,
            anchor_min_valid: 0,
            anchor_min_head_volume: 0,
            min_coverage: 0.0,
            max_zero_ratio: 1.0,
            min_valid: 0,
        };
        let pending = vec![KeywordRow::unverified("anchor 0 razor", "Anchor 0", "shaving", Utc::now())];

        for rows in [Vec::new(), pending] {
            let v = evaluate(&snap, &rows, CertificationTier::Lite, CertificationPolicy::Standard, &permissive);
            assert!(!v.pass);
            assert_eq!(v.awarded_tier, None);
            assert_eq!(v.lifecycle, Lifecycle::Draft);
            assert_eq!(v.gates.len(), 1);
            assert_eq!(v.gates[0].gate, GateId::Poison);
        }
    }

    #[test]
    fn test_lean_full_falls_back_to_lite() {
        let snap = snapshot(2);
        let rows = rows("Anchor 0", 8, 20, 50);
        let v = evaluate(&snap, &rows, CertificationTier::Full, CertificationPolicy::LeanRebuild, &config());
        assert!(v.pass);
        assert_eq!(v.awarded_tier, Some(CertificationTier::Lite));
        assert_eq!(v.lifecycle, Lifecycle::CertifiedLite);
        assert!(v.reasons.is_empty());
    }

    #[test]
    fn test_evaluation_never_lowers_lifecycle() {
        let mut snap = snapshot(2);
        snap.lifecycle = Lifecycle::CertifiedFull;
        let rows = rows("Anchor 0", 8, 20, 50);
        let first = evaluate(&snap, &rows, CertificationTier::Lite, CertificationPolicy::LeanRebuild, &config());
        assert_eq!(first.lifecycle, Lifecycle::CertifiedFull);
        snap.lifecycle = first.lifecycle;
        let second = evaluate(&snap, &rows, CertificationTier::Lite, CertificationPolicy::LeanRebuild, &config());
        assert_eq!(first, second);
    }
}
