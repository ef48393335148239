//! Corpus health report.
//!
//! A 0-100 score with a traffic-light grade, derived from zero density,
//! anchor coverage, volume weighting and head concentration.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::models::{CorpusCounts, HealthGrade, KeywordRow, KeywordStatus, Snapshot};

const GREEN_FLOOR: f64 = 80.0;
const AMBER_FLOOR: f64 = 60.0;
const CONCENTRATION_LIMIT_PCT: f64 = 75.0;
const ZERO_DENSITY_WARN_PCT: f64 = 20.0;

/// What an operator should do with the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendedAction {
    /// Nothing to do
    Keep,
    /// Prune zero-volume rows
    Cleanup,
    /// Prune, then certify again
    CleanupAndRecertify,
}

/// Health diagnostics for one snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// Category of the snapshot
    pub category_id: String,
    /// Snapshot that was measured
    pub snapshot_id: String,
    /// Row counts by status
    pub counts: CorpusCounts,
    /// Zero rows as a percentage of all rows
    pub zero_pct: f64,
    /// Summed volume of every row
    pub total_volume: u64,
    /// Summed volume of valid rows
    pub valid_volume: u64,
    /// Valid volume as a percentage of all volume
    pub volume_weighted_valid_pct: f64,
    /// Median valid volume
    pub p50: u64,
    /// 90th percentile valid volume
    pub p90: u64,
    /// Volume share held by the ten largest keywords, in percent
    pub top10_share_pct: f64,
    /// Anchors with no valid rows
    pub anchors_with_zero_valid: usize,
    /// Zero-row percentage per anchor
    pub anchor_zero_pct: BTreeMap<String, f64>,
    /// Health score, 0 to 100
    pub score: f64,
    /// Grade derived from the score
    pub grade: HealthGrade,
    /// Suggested follow-up
    pub action: RecommendedAction,
    /// Human-readable findings
    pub warnings: Vec<String>,
}

fn grade_for(score: f64) -> HealthGrade {
    if score >= GREEN_FLOOR {
        HealthGrade::Green
    } else if score >= AMBER_FLOOR {
        HealthGrade::Amber
    } else {
        HealthGrade::Red
    }
}

#[allow(clippy::cast_precision_loss)]
fn pct(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn volume(row: &KeywordRow) -> u64 {
    row.volume.unwrap_or(0)
}

fn is_valid(row: &KeywordRow) -> bool {
    !row.is_unverified() && row.status == KeywordStatus::Valid
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn percentile(sorted: &[u64], q: f64) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let index = ((sorted.len() as f64) * q).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// Compute the health report for a snapshot's rows.
#[allow(clippy::cast_precision_loss)]
pub fn compute_health(snapshot: &Snapshot, rows: &[KeywordRow]) -> HealthReport {
    let counts = CorpusCounts::from_rows(rows);
    let zero_pct = pct(counts.zero, counts.total);

    let total_volume: u64 = rows.iter().map(volume).sum();
    let mut valid_volumes: Vec<u64> = rows.iter().filter(|r| is_valid(r)).map(volume).collect();
    let valid_volume: u64 = valid_volumes.iter().sum();
    let weighted_valid_pct = pct(valid_volume, total_volume);
    valid_volumes.sort_unstable();

    let mut by_volume: Vec<u64> = rows.iter().map(volume).collect();
    by_volume.sort_unstable_by(|a, b| b.cmp(a));
    let top10: u64 = by_volume.iter().take(10).sum();
    let top10_share_pct = pct(top10, total_volume);

    let mut anchors_with_zero_valid = 0;
    let mut anchor_zero_pct = BTreeMap::new();
    for anchor in &snapshot.anchors {
        let anchor_rows: Vec<&KeywordRow> = rows.iter().filter(|r| r.anchor_id == anchor.id).collect();
        if !anchor_rows.iter().any(|r| is_valid(r)) {
            anchors_with_zero_valid += 1;
        }
        let zero = anchor_rows
            .iter()
            .filter(|r| !r.is_unverified() && r.status != KeywordStatus::Valid)
            .count();
        anchor_zero_pct.insert(anchor.id.clone(), pct(zero as u64, anchor_rows.len() as u64));
    }

    let mut score = 100.0;
    score -= (zero_pct * 0.6).min(40.0);
    score -= (anchors_with_zero_valid as f64 * 5.0).min(25.0);
    if total_volume > 0 {
        score -= ((100.0 - weighted_valid_pct) * 0.25).min(25.0);
    }
    if top10_share_pct > CONCENTRATION_LIMIT_PCT {
        score -= 10.0;
    }
    let score = (score.clamp(0.0, 100.0) * 10.0).round() / 10.0;
    let grade = grade_for(score);
    let action = match grade {
        HealthGrade::Green => RecommendedAction::Keep,
        HealthGrade::Amber => RecommendedAction::Cleanup,
        HealthGrade::Red => RecommendedAction::CleanupAndRecertify,
    };

    let mut warnings = Vec::new();
    if zero_pct > ZERO_DENSITY_WARN_PCT {
        warnings.push(format!("High zero-volume density: {zero_pct:.1}%"));
    }
    if anchors_with_zero_valid > 0 {
        warnings.push(format!("{anchors_with_zero_valid} anchors have zero valid keywords"));
    }
    if top10_share_pct > CONCENTRATION_LIMIT_PCT {
        warnings.push(format!(
            "High volume concentration: top 10 keywords drive {top10_share_pct:.1}% of volume"
        ));
    }
    if counts.unverified > 0 {
        warnings.push(format!("Unverified accumulation: {} pending rows", counts.unverified));
    }

    HealthReport {
        category_id: snapshot.category_id.clone(),
        snapshot_id: snapshot.id.clone(),
        counts,
        zero_pct,
        total_volume,
        valid_volume,
        volume_weighted_valid_pct: weighted_valid_pct,
        p50: percentile(&valid_volumes, 0.5),
        p90: percentile(&valid_volumes, 0.9),
        top10_share_pct,
        anchors_with_zero_valid,
        anchor_zero_pct,
        score,
        grade,
        action,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Anchor, CorpusKey};
    use chrono::Utc;

    fn snapshot(anchors: &[&str]) -> Snapshot {
        let anchors = anchors
            .iter()
            .enumerate()
            .map(|(i, a)| Anchor::scan(*a, i as u32))
            .collect();
        Snapshot::draft(&CorpusKey::new("shaving", "IN", "en"), anchors, Utc::now())
    }

    fn row(text: &str, anchor: &str, volume: u64) -> KeywordRow {
        let mut r = KeywordRow::unverified(text, anchor, "shaving", Utc::now());
        r.record_volume(volume, None, None, Utc::now());
        r.prune();
        r
    }

    #[test]
    fn test_healthy_corpus_is_green() {
        let snap = snapshot(&["A", "B"]);
        let rows: Vec<KeywordRow> = (0..40)
            .map(|i| row(&format!("razor {i}"), if i % 2 == 0 { "A" } else { "B" }, 100))
            .collect();
        let report = compute_health(&snap, &rows);
        assert_eq!(report.grade, HealthGrade::Green);
        assert!((report.score - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.p50, 100);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_zero_heavy_corpus_with_empty_anchors_is_red() {
        let snap = snapshot(&["A", "B", "C", "D"]);
        let mut rows: Vec<KeywordRow> = (0..30).map(|i| row(&format!("razor {i}"), "A", 0)).collect();
        rows.push(row("razor gold", "A", 5000));
        let report = compute_health(&snap, &rows);
        // 96.8% zero costs 40, three empty anchors 15, concentration 10
        assert_eq!(report.anchors_with_zero_valid, 3);
        assert_eq!(report.grade, HealthGrade::Red);
        assert_eq!(report.action, RecommendedAction::CleanupAndRecertify);
        assert!(report.warnings.iter().any(|w| w.contains("concentration")));
    }

    #[test]
    fn test_empty_corpus() {
        let report = compute_health(&snapshot(&["A"]), &[]);
        assert_eq!(report.p90, 0);
        assert_eq!(report.anchors_with_zero_valid, 1);
        assert!((report.score - 95.0).abs() < f64::EPSILON);
    }
}
