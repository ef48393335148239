//! Keyword row domain model.
//!
//! A keyword row is one candidate search term inside a snapshot. Rows start
//! unverified, get a volume from the provider, and are pruned to inactive when
//! no signal backs them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::snapshot::Anchor;

/// Verification status of a keyword row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordStatus {
    /// Not yet checked against the provider
    Unverified,
    /// Confirmed positive volume
    Valid,
    /// Confirmed zero volume
    Zero,
    /// Lookup failed terminally for this row
    Error,
}

impl KeywordStatus {
    /// Stored form of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "UNVERIFIED",
            Self::Valid => "VALID",
            Self::Zero => "ZERO",
            Self::Error => "ERROR",
        }
    }

    /// Parse a stored status, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNVERIFIED" => Some(Self::Unverified),
            "VALID" => Some(Self::Valid),
            "ZERO" => Some(Self::Zero),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Coarse search intent of a keyword, inferred from cue words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentBucket {
    /// Ready-to-buy terms: price, offers, shops
    Decision,
    /// Comparisons and reviews
    Consideration,
    /// Problems the shopper wants solved
    Problem,
    /// Everything else
    Discovery,
}

const DECISION_CUES: &[&str] = &["buy", "price", "offer", "online", "cost", "amazon", "shop"];
const CONSIDERATION_CUES: &[&str] = &["best", "review", "vs", "top", "better", "brand"];
const PROBLEM_CUES: &[&str] = &[
    "burn",
    "irritation",
    "bump",
    "fix",
    "solution",
    "problem",
    "pain",
    "acne",
];

impl IntentBucket {
    /// Classify a keyword by the first cue family it contains.
    pub fn infer(keyword: &str) -> Self {
        let text = keyword.to_lowercase();
        let has = |cues: &[&str]| cues.iter().any(|cue| text.contains(cue));
        if has(DECISION_CUES) {
            Self::Decision
        } else if has(CONSIDERATION_CUES) {
            Self::Consideration
        } else if has(PROBLEM_CUES) {
            Self::Problem
        } else {
            Self::Discovery
        }
    }

    /// Stored form of the bucket
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "DECISION",
            Self::Consideration => "CONSIDERATION",
            Self::Problem => "PROBLEM",
            Self::Discovery => "DISCOVERY",
        }
    }

    /// Parse a stored bucket, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DECISION" => Some(Self::Decision),
            "CONSIDERATION" => Some(Self::Consideration),
            "PROBLEM" => Some(Self::Problem),
            "DISCOVERY" => Some(Self::Discovery),
            _ => None,
        }
    }
}

/// Normalize a keyword for deduplication and response matching.
///
/// Lowercases, drops punctuation and collapses whitespace runs.
pub fn normalize_keyword(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() {
                Some(c)
            } else if c.is_whitespace() {
                Some(' ')
            } else {
                None
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Stable row id derived from the normalized text and owning category.
pub fn keyword_id(normalized: &str, category_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(category_id.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// A keyword inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRow {
    /// Stable id derived from the normalized text and category
    pub id: String,
    /// Keyword text as generated or discovered
    pub text: String,
    /// Anchor the row is assigned to
    pub anchor_id: String,
    /// Inferred search intent
    pub intent: IntentBucket,
    /// Verification status
    pub status: KeywordStatus,
    /// Primary search volume; `None` exactly while the row is unverified
    pub volume: Option<u64>,
    /// Volume attached by the discovery surface, if any
    pub secondary_volume: Option<u64>,
    /// Cost per click reported by the provider
    pub cpc: Option<f64>,
    /// Provider competition index
    pub competition_index: Option<f64>,
    /// False once pruned
    pub active: bool,
    /// When the row was first persisted
    pub created_at: DateTime<Utc>,
    /// When the provider last answered for this row
    pub validated_at: Option<DateTime<Utc>>,
}

impl KeywordRow {
    /// Create a fresh unverified row.
    pub fn unverified(
        text: impl Into<String>,
        anchor_id: impl Into<String>,
        category_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let text = text.into();
        let normalized = normalize_keyword(&text);
        Self {
            id: keyword_id(&normalized, category_id),
            intent: IntentBucket::infer(&normalized),
            text: normalized,
            anchor_id: anchor_id.into(),
            status: KeywordStatus::Unverified,
            volume: None,
            secondary_volume: None,
            cpc: None,
            competition_index: None,
            active: true,
            created_at: now,
            validated_at: None,
        }
    }

    /// Attach a volume observed on the discovery surface.
    #[must_use]
    pub const fn with_secondary_volume(mut self, volume: Option<u64>) -> Self {
        self.secondary_volume = volume;
        self
    }

    /// Text normalized the way lookups are matched
    pub fn normalized_text(&self) -> String {
        normalize_keyword(&self.text)
    }

    /// True while no provider volume has been recorded
    pub const fn is_unverified(&self) -> bool {
        self.volume.is_none()
    }

    /// True when either the primary or the secondary signal is positive.
    pub fn has_positive_signal(&self) -> bool {
        self.volume.unwrap_or(0) > 0 || self.secondary_volume.unwrap_or(0) > 0
    }

    /// Record a provider lookup: positive volume is VALID, anything else ZERO.
    pub fn record_volume(
        &mut self,
        volume: u64,
        cpc: Option<f64>,
        competition_index: Option<f64>,
        at: DateTime<Utc>,
    ) {
        self.volume = Some(volume);
        self.status = if volume > 0 {
            KeywordStatus::Valid
        } else {
            KeywordStatus::Zero
        };
        self.cpc = cpc;
        self.competition_index = competition_index;
        self.validated_at = Some(at);
    }

    /// Apply the prune rule to a verified row. Returns whether the row changed.
    ///
    /// Unverified rows are left alone.
    pub fn prune(&mut self) -> bool {
        if self.is_unverified() {
            return false;
        }
        let before = (self.status, self.active);
        if self.has_positive_signal() {
            self.status = KeywordStatus::Valid;
            self.active = true;
        } else {
            self.status = KeywordStatus::Zero;
            self.active = false;
        }
        before != (self.status, self.active)
    }

    /// The status/volume pairing every persisted row must satisfy.
    pub fn is_consistent(&self) -> bool {
        (self.status == KeywordStatus::Unverified) == self.volume.is_none()
    }
}

/// Aggregate counts over a row set.
///
/// `valid + zero + unverified == total` holds by construction: rows without a
/// volume are unverified, verified rows are valid when their status says so
/// and counted as zero otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusCounts {
    /// All rows
    pub total: u64,
    /// Rows with positive volume
    pub valid: u64,
    /// Verified rows without positive volume
    pub zero: u64,
    /// Rows still waiting on the provider
    pub unverified: u64,
}

impl CorpusCounts {
    /// Count a row set
    pub fn from_rows(rows: &[KeywordRow]) -> Self {
        let mut counts = Self::default();
        for row in rows {
            counts.total += 1;
            if row.is_unverified() {
                counts.unverified += 1;
            } else if row.status == KeywordStatus::Valid {
                counts.valid += 1;
            } else {
                counts.zero += 1;
            }
        }
        counts
    }

    /// Rows that have a provider answer
    pub const fn validated(&self) -> u64 {
        self.total - self.unverified
    }

    /// Valid rows over total, 0 for an empty corpus
    #[allow(clippy::cast_precision_loss)]
    pub fn valid_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.valid as f64 / self.total as f64
        }
    }

    /// Zero rows over total, 0 for an empty corpus
    #[allow(clippy::cast_precision_loss)]
    pub fn zero_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.zero as f64 / self.total as f64
        }
    }
}

/// Per-anchor aggregates used by growth sizing and certification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorCounts {
    /// Rows assigned to the anchor
    pub total: u64,
    /// Valid rows assigned to the anchor
    pub valid: u64,
    /// Highest volume among the anchor's rows
    pub max_volume: u64,
}

/// Aggregate rows per anchor. Every anchor appears, even with no rows.
pub fn anchor_counts(rows: &[KeywordRow], anchors: &[Anchor]) -> BTreeMap<String, AnchorCounts> {
    let mut counts: BTreeMap<String, AnchorCounts> = anchors
        .iter()
        .map(|a| (a.id.clone(), AnchorCounts::default()))
        .collect();
    for row in rows {
        let entry = counts.entry(row.anchor_id.clone()).or_default();
        entry.total += 1;
        if !row.is_unverified() && row.status == KeywordStatus::Valid {
            entry.valid += 1;
            entry.max_volume = entry.max_volume.max(row.volume.unwrap_or(0));
        }
    }
    counts
}
