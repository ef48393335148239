//! Snapshot domain model.
//!
//! A snapshot is the working copy of one category's corpus for a
//! (country, language) market. Its lifecycle only moves forward, except
//! through the explicit rebuild reset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::certification::CertificationRecord;
use super::keyword::CorpusCounts;

/// Corpus maturity stage. Declaration order is promotion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lifecycle {
    /// Created, no rows yet
    Draft,
    /// Has rows, some may be unverified
    Hydrated,
    /// Every row verified
    Validated,
    /// Verified with enough valid rows for a lite certification attempt
    ValidatedLite,
    /// Passed LITE certification
    CertifiedLite,
    /// Passed FULL certification
    CertifiedFull,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::Draft
    }
}

impl Lifecycle {
    /// Stored form of the lifecycle
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Hydrated => "HYDRATED",
            Self::Validated => "VALIDATED",
            Self::ValidatedLite => "VALIDATED_LITE",
            Self::CertifiedLite => "CERTIFIED_LITE",
            Self::CertifiedFull => "CERTIFIED_FULL",
        }
    }

    /// Parse a stored lifecycle, case-insensitively
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "HYDRATED" => Some(Self::Hydrated),
            "VALIDATED" => Some(Self::Validated),
            "VALIDATED_LITE" => Some(Self::ValidatedLite),
            "CERTIFIED_LITE" => Some(Self::CertifiedLite),
            "CERTIFIED_FULL" => Some(Self::CertifiedFull),
            _ => None,
        }
    }

    /// True for either certified stage
    pub const fn is_certified(&self) -> bool {
        matches!(self, Self::CertifiedLite | Self::CertifiedFull)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an anchor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorSource {
    /// Drafted from the category dictionary
    Scan,
    /// Added during growth
    Expansion,
}

/// A thematic bucket inside a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    /// Anchor name, unique within a snapshot
    pub id: String,
    /// Display and assignment order
    pub order: u32,
    /// Where the anchor came from
    pub source: AnchorSource,
}

impl Anchor {
    /// An anchor taken from the category dictionary
    pub fn scan(id: impl Into<String>, order: u32) -> Self {
        Self {
            id: id.into(),
            order,
            source: AnchorSource::Scan,
        }
    }

    /// Significant name tokens: lowercased, split on whitespace, `&` and `/`,
    /// keeping tokens longer than three characters.
    pub fn tokens(&self) -> Vec<String> {
        self.id
            .to_lowercase()
            .split(|c: char| c.is_whitespace() || c == '&' || c == '/')
            .filter(|t| t.chars().count() > 3)
            .map(str::to_string)
            .collect()
    }
}

/// Address of the active snapshot for a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorpusKey {
    /// Category the corpus belongs to
    pub category_id: String,
    /// Market country code
    pub country: String,
    /// Market language code
    pub language: String,
}

impl CorpusKey {
    /// Build a key from its parts
    pub fn new(
        category_id: impl Into<String>,
        country: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            category_id: category_id.into(),
            country: country.into(),
            language: language.into(),
        }
    }
}

impl fmt::Display for CorpusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.category_id, self.country, self.language)
    }
}

/// Summary statistics written with the snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Row count at the last recompute
    pub total: u64,
    /// Valid rows at the last recompute
    pub valid: u64,
    /// Zero rows at the last recompute
    pub zero: u64,
    /// Rows with a provider answer at the last recompute
    pub validated: u64,
}

impl From<CorpusCounts> for SnapshotStats {
    fn from(counts: CorpusCounts) -> Self {
        Self {
            total: counts.total,
            valid: counts.valid,
            zero: counts.zero,
            validated: counts.validated(),
        }
    }
}

/// A category corpus snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot id, `snap_` plus a uuid
    pub id: String,
    /// Category the snapshot belongs to
    pub category_id: String,
    /// Market country code
    pub country: String,
    /// Market language code
    pub language: String,
    /// Current maturity stage
    pub lifecycle: Lifecycle,
    /// Thematic buckets rows are assigned to
    pub anchors: Vec<Anchor>,
    /// Counts from the last recompute
    pub stats: SnapshotStats,
    /// Last certification attempt, cleared by a rebuild reset
    pub certification: Option<CertificationRecord>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last write time
    pub updated_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a DRAFT snapshot for a market.
    pub fn draft(key: &CorpusKey, anchors: Vec<Anchor>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("snap_{}", Uuid::new_v4().simple()),
            category_id: key.category_id.clone(),
            country: key.country.clone(),
            language: key.language.clone(),
            lifecycle: Lifecycle::Draft,
            anchors,
            stats: SnapshotStats::default(),
            certification: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Market key this snapshot is indexed under
    pub fn key(&self) -> CorpusKey {
        CorpusKey::new(&self.category_id, &self.country, &self.language)
    }

    /// Raise the lifecycle to `target` if it is higher. Returns whether it moved.
    pub fn promote(&mut self, target: Lifecycle) -> bool {
        if target > self.lifecycle {
            self.lifecycle = target;
            true
        } else {
            false
        }
    }

    /// Explicit downgrade so a snapshot can be grown again.
    pub fn reset_for_rebuild(&mut self, has_rows: bool, now: DateTime<Utc>) {
        self.lifecycle = if has_rows {
            Lifecycle::Hydrated
        } else {
            Lifecycle::Draft
        };
        self.certification = None;
        self.updated_at = now;
    }

    /// Append an expansion anchor unless one with the same id exists.
    pub fn ensure_anchor(&mut self, id: &str) -> bool {
        if self.anchors.iter().any(|a| a.id.eq_ignore_ascii_case(id)) {
            return false;
        }
        let order = self.anchors.iter().map(|a| a.order + 1).max().unwrap_or(0);
        self.anchors.push(Anchor {
            id: id.to_string(),
            order,
            source: AnchorSource::Expansion,
        });
        true
    }

    /// Store recomputed counts on the snapshot
    pub fn apply_counts(&mut self, counts: CorpusCounts, now: DateTime<Utc>) {
        self.stats = counts.into();
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> CorpusKey {
        CorpusKey::new("shaving", "IN", "en")
    }

    #[test]
    fn test_lifecycle_ordering() {
        assert!(Lifecycle::Draft < Lifecycle::Hydrated);
        assert!(Lifecycle::ValidatedLite < Lifecycle::CertifiedLite);
        assert!(Lifecycle::CertifiedLite < Lifecycle::CertifiedFull);
        assert!(Lifecycle::CertifiedFull.is_certified());
        assert!(!Lifecycle::ValidatedLite.is_certified());
    }

    #[test]
    fn test_lifecycle_str_roundtrip_names() {
        assert_eq!(Lifecycle::from_str("validated_lite"), Some(Lifecycle::ValidatedLite));
        assert_eq!(Lifecycle::CertifiedFull.as_str(), "CERTIFIED_FULL");
        assert_eq!(Lifecycle::from_str("sealed"), None);
    }

    #[test]
    fn test_promote_is_monotonic() {
        let mut snap = Snapshot::draft(&key(), vec![], Utc::now());
        assert!(snap.promote(Lifecycle::Validated));
        assert!(!snap.promote(Lifecycle::Hydrated));
        assert_eq!(snap.lifecycle, Lifecycle::Validated);
    }

    #[test]
    fn test_reset_for_rebuild_downgrades() {
        let mut snap = Snapshot::draft(&key(), vec![], Utc::now());
        snap.promote(Lifecycle::CertifiedFull);
        snap.reset_for_rebuild(true, Utc::now());
        assert_eq!(snap.lifecycle, Lifecycle::Hydrated);
        snap.reset_for_rebuild(false, Utc::now());
        assert_eq!(snap.lifecycle, Lifecycle::Draft);
    }

    #[test]
    fn test_ensure_anchor_appends_expansion_once() {
        let mut snap = Snapshot::draft(&key(), vec![Anchor::scan("Razors", 0)], Utc::now());
        assert!(snap.ensure_anchor("Beard Care"));
        assert!(!snap.ensure_anchor("razors"));
        assert_eq!(snap.anchors.len(), 2);
        assert_eq!(snap.anchors[1].order, 1);
        assert_eq!(snap.anchors[1].source, AnchorSource::Expansion);
    }

    #[test]
    fn test_anchor_tokens() {
        let anchor = Anchor::scan("Razors & Blades/Cartridge kit", 0);
        assert_eq!(anchor.tokens(), vec!["razors", "blades", "cartridge"]);
    }

    #[test]
    fn test_corpus_key_display() {
        assert_eq!(key().to_string(), "shaving/IN/en");
    }
}
