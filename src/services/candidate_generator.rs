//! Candidate keyword generation from category dictionaries.
//!
//! Templates combine brands and head terms; anchors that are short of valid
//! rows get candidate budgets proportional to their deficit. Output is sorted
//! so a pass is reproducible for the same dictionary and corpus.

use std::collections::{BTreeSet, HashSet};

use crate::domain::models::{
    anchor_counts, normalize_keyword, Anchor, CategoryDictionary, GrowthConfig, KeywordRow,
};
use crate::domain::ports::VolumeRecord;
use crate::services::keyword_guard::KeywordGuard;

const TOP_BRANDS: usize = 25;
const TOP_HEADS: usize = 15;
const MIN_CANDIDATE_LEN: usize = 5;

const INTENT_MODIFIERS: &[&str] = &[
    "price",
    "review",
    "vs",
    "alternative",
    "side effects",
    "how to use",
    "benefits",
    "for sensitive skin",
    "natural",
    "affordable",
    "premium",
    "recommended",
    "dermatologist",
];

fn brand_head_templates(brand: &str, head: &str) -> [String; 10] {
    [
        format!("{brand} {head}"),
        format!("{brand} {head} price"),
        format!("{brand} {head} for men"),
        format!("best {head} {brand}"),
        format!("{brand} {head} online"),
        format!("{brand} {head} review"),
        format!("{head} by {brand}"),
        format!("{brand} new {head}"),
        format!("{brand} {head} combo"),
        format!("{brand} {head} kit"),
    ]
}

/// First word of an anchor name, used to give templates anchor context.
fn anchor_context(anchor: &Anchor) -> Option<String> {
    let cleaned = anchor.id.to_lowercase().replace('&', "");
    cleaned
        .split_whitespace()
        .next()
        .filter(|t| t.chars().count() > 3)
        .map(str::to_string)
}

/// Candidate budget for an anchor that is `deficit` valid rows short.
pub fn per_anchor_limit(deficit: u64, config: &GrowthConfig) -> u64 {
    (deficit * config.candidate_multiplier)
        .clamp(config.min_candidates_per_anchor, config.max_candidates_per_anchor.max(config.min_candidates_per_anchor))
}

/// Builds template candidates and discovery seeds for one category
pub struct CandidateGenerator {
    dictionary: CategoryDictionary,
    guard: KeywordGuard,
    config: GrowthConfig,
}

impl CandidateGenerator {
    /// A generator for one category dictionary
    pub fn new(dictionary: CategoryDictionary, config: GrowthConfig) -> Self {
        Self {
            guard: KeywordGuard::new(&dictionary),
            dictionary,
            config,
        }
    }

    /// Guard every candidate passes through
    pub const fn guard(&self) -> &KeywordGuard {
        &self.guard
    }

    fn heads(&self) -> Vec<String> {
        self.dictionary
            .head_terms
            .iter()
            .map(|h| normalize_keyword(h))
            .filter(|h| !h.is_empty())
            .collect()
    }

    fn brands(&self) -> Vec<String> {
        self.dictionary
            .brands
            .iter()
            .map(|b| normalize_keyword(b))
            .filter(|b| !b.is_empty())
            .collect()
    }

    /// Guarded template candidates for one anchor that are not in `exclude`,
    /// at most `limit`, sorted. Exclusion happens before the limit so later
    /// passes reach further into the template set.
    pub fn templates_for_anchor(&self, anchor: &Anchor, exclude: &HashSet<String>, limit: usize) -> Vec<String> {
        let heads = self.heads();
        let brands = self.brands();
        if heads.is_empty() && brands.is_empty() {
            return Vec::new();
        }
        let usable = |k: &String| {
            k.len() >= MIN_CANDIDATE_LEN
                && k.contains(' ')
                && (heads.iter().any(|h| k.contains(h.as_str())) || brands.iter().any(|b| k.contains(b.as_str())))
                && self.guard.is_specific(k)
                && !exclude.contains(k)
        };
        let context = anchor_context(anchor);
        let top_heads = &heads[..heads.len().min(TOP_HEADS)];
        let mut candidates = BTreeSet::new();

        for brand in brands.iter().take(TOP_BRANDS) {
            for head in top_heads {
                for template in brand_head_templates(brand, head) {
                    candidates.insert(normalize_keyword(&template));
                }
                if let Some(token) = &context {
                    candidates.insert(normalize_keyword(&format!("{brand} {head} {token}")));
                }
            }
        }

        if candidates.iter().filter(|k| usable(*k)).count() < limit {
            for head in top_heads {
                candidates.insert(normalize_keyword(&format!("best {head} in india")));
                candidates.insert(normalize_keyword(&format!("{head} brands list")));
                candidates.insert(normalize_keyword(&format!("{head} price list")));
                candidates.insert(normalize_keyword(&format!("top 10 {head}")));
                if let Some(token) = &context {
                    candidates.insert(normalize_keyword(&format!("{head} for {token}")));
                }
            }
        }

        candidates.into_iter().filter(|k| usable(k)).take(limit).collect()
    }

    /// New candidates for the pass: template output for every anchor below
    /// the per-anchor target, excluding existing rows and earlier anchors'
    /// picks, capped overall.
    pub fn generate(&self, anchors: &[Anchor], rows: &[KeywordRow]) -> Vec<String> {
        let counts = anchor_counts(rows, anchors);
        let mut taken: HashSet<String> = rows.iter().map(KeywordRow::normalized_text).collect();
        let mut out = Vec::new();

        for anchor in anchors {
            if out.len() >= self.config.candidate_cap {
                break;
            }
            let valid = counts.get(&anchor.id).map_or(0, |c| c.valid);
            let deficit = self.config.target_per_anchor.saturating_sub(valid);
            if deficit == 0 {
                continue;
            }
            let limit = usize::try_from(per_anchor_limit(deficit, &self.config)).unwrap_or(usize::MAX);
            for candidate in self.templates_for_anchor(anchor, &taken, limit) {
                taken.insert(candidate.clone());
                out.push(candidate);
            }
        }
        out.truncate(self.config.candidate_cap);
        out
    }

    /// Full seed list for the related-keywords surface.
    pub fn discovery_seeds(&self) -> Vec<String> {
        let heads = self.heads();
        let brands = self.brands();
        let mut seeds = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |seed: String| {
            let seed = normalize_keyword(&seed);
            if !seed.is_empty() && seen.insert(seed.clone()) {
                seeds.push(seed);
            }
        };

        for head in &heads {
            push(head.clone());
            push(format!("{head} for men"));
            push(format!("best {head}"));
            push(format!("{head} india"));
        }
        for head in heads.iter().take(8) {
            for modifier in INTENT_MODIFIERS {
                push(format!("{head} {modifier}"));
            }
        }
        let lead = heads.first().cloned().unwrap_or_default();
        for brand in brands.iter().take(10) {
            push(format!("{brand} {lead}"));
            push(format!("{brand} products"));
        }
        for seed in &self.dictionary.discovery_seeds {
            push(seed.clone());
        }
        seeds
    }

    /// Seeds for pass `pass` (1-based): consecutive slices so each pass
    /// explores different ground.
    pub fn discovery_seeds_for_pass(&self, pass: u32) -> Vec<String> {
        let per_pass = self.config.discovery_seeds_per_pass.max(1);
        let start = (pass.saturating_sub(1) as usize).saturating_mul(per_pass);
        self.discovery_seeds().into_iter().skip(start).take(per_pass).collect()
    }

    /// Keep discovered terms that pass the guard and are new to the corpus
    /// and to `taken`.
    pub fn filter_discovered(
        &self,
        discovered: Vec<VolumeRecord>,
        rows: &[KeywordRow],
        taken: &[String],
    ) -> Vec<VolumeRecord> {
        let mut existing: HashSet<String> = rows.iter().map(KeywordRow::normalized_text).collect();
        existing.extend(taken.iter().cloned());
        discovered
            .into_iter()
            .filter_map(|mut record| {
                let normalized = normalize_keyword(&record.keyword);
                if !self.guard.is_specific(&normalized) || !existing.insert(normalized.clone()) {
                    return None;
                }
                record.keyword = normalized;
                Some(record)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Config, KeywordRow};
    use chrono::Utc;

    fn generator() -> CandidateGenerator {
        let config = Config::default();
        CandidateGenerator::new(config.categories["shaving"].clone(), config.growth)
    }

    #[test]
    fn test_per_anchor_limit_clamps() {
        let config = GrowthConfig::default();
        assert_eq!(per_anchor_limit(10, &config), 250);
        assert_eq!(per_anchor_limit(100, &config), 600);
        assert_eq!(per_anchor_limit(400, &config), 1000);
    }

    #[test]
    fn test_templates_are_sorted_and_bounded() {
        let g = generator();
        let anchor = Anchor::scan("Trimmers", 0);
        let out = g.templates_for_anchor(&anchor, &HashSet::new(), 50);
        assert_eq!(out.len(), 50);
        let mut sorted = out.clone();
        sorted.sort();
        assert_eq!(out, sorted);
    }

    #[test]
    fn test_generate_skips_existing_rows_and_guarded_terms() {
        let g = generator();
        let anchors = vec![Anchor::scan("Razors & Blades", 0)];
        let first = g.generate(&anchors, &[]);
        assert!(!first.is_empty());
        assert!(first.iter().all(|k| g.guard().is_specific(k)));

        let rows: Vec<KeywordRow> = first
            .iter()
            .take(10)
            .map(|k| KeywordRow::unverified(k, "Razors & Blades", "shaving", Utc::now()))
            .collect();
        let second = g.generate(&anchors, &rows);
        assert!(rows.iter().all(|r| !second.contains(&r.text)));
    }

    #[test]
    fn test_later_passes_reach_unused_templates() {
        let g = generator();
        let anchors = vec![Anchor::scan("Razors & Blades", 0), Anchor::scan("Trimmers", 1)];
        let first = g.generate(&anchors, &[]);
        assert!(!first.is_empty());

        let rows: Vec<KeywordRow> = first
            .iter()
            .map(|k| KeywordRow::unverified(k, "Razors & Blades", "shaving", Utc::now()))
            .collect();
        let second = g.generate(&anchors, &rows);
        assert!(!second.is_empty());
        assert!(second.iter().all(|k| !first.contains(k)));
        assert!(second.iter().all(|k| g.guard().is_specific(k)));
    }

    #[test]
    fn test_discovery_seed_slices_do_not_overlap() {
        let g = generator();
        let a = g.discovery_seeds_for_pass(1);
        let b = g.discovery_seeds_for_pass(2);
        assert_eq!(a.len(), 20);
        assert!(a.iter().all(|s| !b.contains(s)));
    }

    #[test]
    fn test_filter_discovered_applies_guard_and_dedupe() {
        let g = generator();
        let records = vec![
            VolumeRecord { keyword: "Razor Burn Cream".into(), volume: 900, cpc: None, competition_index: None },
            VolumeRecord { keyword: "razor burn cream".into(), volume: 900, cpc: None, competition_index: None },
            VolumeRecord { keyword: "lipstick shade".into(), volume: 50, cpc: None, competition_index: None },
        ];
        let kept = g.filter_discovered(records, &[], &[]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].keyword, "razor burn cream");
    }
}
