//! Certification verdict types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::snapshot::Lifecycle;

/// Strictness profile requested for certification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CertificationTier {
    /// Full certification tier
    Full,
    /// Relaxed lite tier
    Lite,
}

impl CertificationTier {
    /// Stored form of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Lite => "LITE",
        }
    }

    /// Parse a stored tier, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "FULL" => Some(Self::Full),
            "LITE" => Some(Self::Lite),
            _ => None,
        }
    }

    /// Lifecycle a pass at this tier grants.
    pub const fn lifecycle(&self) -> Lifecycle {
        match self {
            Self::Full => Lifecycle::CertifiedFull,
            Self::Lite => Lifecycle::CertifiedLite,
        }
    }
}

impl fmt::Display for CertificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which gate profile evaluates a snapshot. Always chosen explicitly by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationPolicy {
    /// Multi-gate profile for regular certification
    Standard,
    /// Relaxed two-tier profile used by rebuild flows
    LeanRebuild,
}

impl CertificationPolicy {
    /// Stored form of the policy
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::LeanRebuild => "lean_rebuild",
        }
    }

    /// Parse a stored policy, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "standard" => Some(Self::Standard),
            "lean_rebuild" | "lean" => Some(Self::LeanRebuild),
            _ => None,
        }
    }
}

/// Corpus health grade, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthGrade {
    /// Healthy corpus
    Green,
    /// Usable with warnings
    Amber,
    /// Needs work before certification
    Red,
}

impl HealthGrade {
    /// Stored form of the grade
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Amber => "AMBER",
            Self::Red => "RED",
        }
    }
}

/// Individual certification gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateId {
    /// Gate A: enough anchors with valid depth and head volume
    Anchors,
    /// Gate B: valid share of all rows
    Coverage,
    /// Gate C: zero share of all rows
    ZeroRatio,
    /// Gate D: corpus health grade
    Health,
    /// Gate E: absolute valid floor
    ValidFloor,
    /// Refusal of a corpus with no valid rows
    Poison,
}

impl GateId {
    /// Label used in gate details and reasons
    pub fn label(&self) -> &'static str {
        match self {
            Self::Anchors => "Gate A (Anchors)",
            Self::Coverage => "Gate B (Coverage)",
            Self::ZeroRatio => "Gate C (Zero Ratio)",
            Self::Health => "Gate D (Health)",
            Self::ValidFloor => "Gate E (Valid Floor)",
            Self::Poison => "POISON_GUARD",
        }
    }
}

/// Outcome of one gate, with the measured value spelled out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    /// Which gate ran
    pub gate: GateId,
    /// Tier the gate was evaluated for
    pub tier: CertificationTier,
    /// Whether the threshold was met
    pub passed: bool,
    /// Measured value against the threshold
    pub detail: String,
}

/// Measurements the gates were evaluated against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationMetrics {
    /// All rows
    pub total: u64,
    /// Valid rows
    pub valid: u64,
    /// Zero rows
    pub zero: u64,
    /// Unverified rows
    pub unverified: u64,
    /// Valid share, 0 to 1
    pub coverage: f64,
    /// Zero share, 0 to 1
    pub zero_ratio: f64,
    /// Anchors in the snapshot
    pub anchors_total: usize,
    /// Anchors meeting the per-anchor bar
    pub anchors_passing: usize,
    /// Health score, standard policy only
    pub health_score: Option<f64>,
    /// Health grade, standard policy only
    pub health_grade: Option<HealthGrade>,
}

/// Result of evaluating a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationVerdict {
    /// Whether any tier was awarded
    pub pass: bool,
    /// Policy that evaluated the snapshot
    pub policy: CertificationPolicy,
    /// Tier the caller asked for
    pub requested_tier: CertificationTier,
    /// Tier actually granted; lean policy may fall back to LITE
    pub awarded_tier: Option<CertificationTier>,
    /// Lifecycle after applying the verdict; never lower than before
    pub lifecycle: Lifecycle,
    /// One entry per failing gate
    pub reasons: Vec<String>,
    /// Every gate evaluated, passing or not
    pub gates: Vec<GateResult>,
    /// Measurements behind the gates
    pub metrics: CertificationMetrics,
}

impl CertificationVerdict {
    /// Reasons joined for job messages.
    pub fn reason_summary(&self) -> String {
        if self.reasons.is_empty() {
            format!(
                "certified {} under {} policy",
                self.awarded_tier.map_or("-", |t| t.as_str()),
                self.policy.as_str()
            )
        } else {
            self.reasons.join("; ")
        }
    }
}

/// Persisted summary of the last certification attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationRecord {
    /// Policy that evaluated the snapshot
    pub policy: CertificationPolicy,
    /// Tier the caller asked for
    pub requested_tier: CertificationTier,
    /// Tier granted, if any
    pub awarded_tier: Option<CertificationTier>,
    /// Whether any tier was awarded
    pub pass: bool,
    /// Failing gate reasons
    pub reasons: Vec<String>,
    /// When the evaluation ran
    pub checked_at: DateTime<Utc>,
}

impl CertificationRecord {
    /// Summarize a verdict for storage
    pub fn from_verdict(verdict: &CertificationVerdict, checked_at: DateTime<Utc>) -> Self {
        Self {
            policy: verdict.policy,
            requested_tier: verdict.requested_tier,
            awarded_tier: verdict.awarded_tier,
            pass: verdict.pass,
            reasons: verdict.reasons.clone(),
            checked_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_lifecycle() {
        assert_eq!(CertificationTier::Full.lifecycle(), Lifecycle::CertifiedFull);
        assert_eq!(CertificationTier::Lite.lifecycle(), Lifecycle::CertifiedLite);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(CertificationPolicy::from_str("lean-rebuild"), Some(CertificationPolicy::LeanRebuild));
        assert_eq!(CertificationPolicy::from_str("Standard"), Some(CertificationPolicy::Standard));
        assert_eq!(CertificationPolicy::from_str("implicit"), None);
    }

    #[test]
    fn test_reason_summary_joins_failures() {
        let verdict = CertificationVerdict {
            pass: false,
            policy: CertificationPolicy::Standard,
            requested_tier: CertificationTier::Full,
            awarded_tier: None,
            lifecycle: Lifecycle::Validated,
            reasons: vec!["Gate B (Coverage): low".into(), "Gate E (Valid Floor): low".into()],
            gates: vec![],
            metrics: CertificationMetrics::default(),
        };
        assert_eq!(verdict.reason_summary(), "Gate B (Coverage): low; Gate E (Valid Floor): low");
    }
}
