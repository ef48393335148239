//! Domain-specificity guard for candidate keywords.
//!
//! A keyword is kept only if it is recognisably about the category: it names
//! a head term, or it pairs a known brand with something more than filler.

use serde::Serialize;

use crate::domain::models::{normalize_keyword, CategoryDictionary};

const GENERIC_TOKENS: &[&str] = &[
    "india", "online", "price", "review", "reviews", "offer", "offers", "benefit", "benefits",
    "best", "top", "cheap", "buy", "sale", "near", "me", "shop", "store", "cost", "how", "what",
    "is", "vs", "compare", "list", "guide", "men", "shopping", "products",
];

const STOPWORDS: &[&str] = &["in", "for", "the", "and", "to", "with", "of", "on", "at", "by"];

/// Remainder tokens that turn a bare brand mention into a shopping query.
const COMMERCE_TOKENS: &[&str] = &[
    "price", "cost", "buy", "online", "review", "reviews", "offer", "offers", "sale", "shop",
    "store", "best", "top", "products", "range", "combo", "kit", "new", "latest", "compare", "vs",
    "alternative",
];

const YEAR_TOKENS: &[&str] = &["2023", "2024", "2025", "2026", "2027"];

/// Why a keyword was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardReason {
    /// A bare head term
    HeadSingle,
    /// A bare brand name
    BrandSingle,
    /// Contains a head term
    HeadTerm,
    /// Contains a brand with a qualifier
    Brand,
    /// Brand with a commerce modifier
    BrandCommerce,
    /// Nothing left after normalization
    Empty,
    /// Shorter than the minimum length
    TooShort,
    /// Mentions a year
    YearToken,
    /// Contains an excluded token
    ExcludedToken,
    /// A single unrecognised token
    UnknownSingleToken,
    /// Only generic words
    GenericComposition,
    /// Brand plus generic words only
    BrandWithGeneric,
    /// Neither a head term nor a qualified brand
    NotCategorySpecific,
}

impl GuardReason {
    /// Operator-facing description
    pub fn describe(&self) -> &'static str {
        match self {
            Self::HeadSingle | Self::BrandSingle | Self::HeadTerm | Self::Brand | Self::BrandCommerce => "OK",
            Self::Empty => "Empty",
            Self::TooShort => "Too Short (Min 3 chars)",
            Self::YearToken => "Contains Year Token",
            Self::ExcludedToken => "Excluded Token",
            Self::UnknownSingleToken => "Single token, not a known head term or brand",
            Self::GenericComposition => "Generic Composition",
            Self::BrandWithGeneric => "Brand + Generic (Low Value)",
            Self::NotCategorySpecific => "Not Category-Specific (Missing Head Term or Qualified Brand)",
        }
    }
}

/// Guard decision for one keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardVerdict {
    /// Whether the keyword is accepted
    pub ok: bool,
    /// Rule that decided
    pub reason: GuardReason,
}

impl GuardVerdict {
    const fn accept(reason: GuardReason) -> Self {
        Self { ok: true, reason }
    }

    const fn reject(reason: GuardReason) -> Self {
        Self { ok: false, reason }
    }
}

fn is_filler(token: &str) -> bool {
    GENERIC_TOKENS.contains(&token) || STOPWORDS.contains(&token)
}

/// Guard bound to one category dictionary.
#[derive(Debug, Clone)]
pub struct KeywordGuard {
    head_terms: Vec<String>,
    brands: Vec<String>,
    excluded: Vec<String>,
}

impl KeywordGuard {
    /// A guard built from a category dictionary
    pub fn new(dictionary: &CategoryDictionary) -> Self {
        let normalized = |items: &[String]| -> Vec<String> {
            items
                .iter()
                .map(|s| normalize_keyword(s))
                .filter(|s| !s.is_empty())
                .collect()
        };
        let mut brands = normalized(&dictionary.brands);
        // Longer brands first so "oral b" is stripped before "oral".
        brands.sort_by_key(|b| std::cmp::Reverse(b.len()));
        Self {
            head_terms: normalized(&dictionary.head_terms),
            brands,
            excluded: normalized(&dictionary.excluded_tokens),
        }
    }

    /// Shorthand for `check(keyword).ok`
    pub fn is_specific(&self, keyword: &str) -> bool {
        self.check(keyword).ok
    }

    /// Check one keyword and say why
    pub fn check(&self, keyword: &str) -> GuardVerdict {
        let norm = normalize_keyword(keyword);
        if norm.is_empty() {
            return GuardVerdict::reject(GuardReason::Empty);
        }
        if norm.chars().count() < 3 {
            return GuardVerdict::reject(GuardReason::TooShort);
        }
        let tokens: Vec<&str> = norm.split(' ').collect();
        if tokens.iter().any(|t| YEAR_TOKENS.contains(t)) {
            return GuardVerdict::reject(GuardReason::YearToken);
        }
        if tokens.iter().any(|t| self.excluded.iter().any(|e| e == t)) {
            return GuardVerdict::reject(GuardReason::ExcludedToken);
        }

        if tokens.len() == 1 {
            if self.head_terms.iter().any(|h| *h == norm) {
                return GuardVerdict::accept(GuardReason::HeadSingle);
            }
            if self.brands.iter().any(|b| *b == norm) {
                return GuardVerdict::accept(GuardReason::BrandSingle);
            }
            return GuardVerdict::reject(GuardReason::UnknownSingleToken);
        }

        if tokens.iter().all(|t| is_filler(t)) {
            return GuardVerdict::reject(GuardReason::GenericComposition);
        }
        if self.head_terms.iter().any(|h| norm.contains(h.as_str())) {
            return GuardVerdict::accept(GuardReason::HeadTerm);
        }

        if !self.brands.iter().any(|b| norm.contains(b.as_str())) {
            return GuardVerdict::reject(GuardReason::NotCategorySpecific);
        }
        let mut remainder = norm.clone();
        for brand in &self.brands {
            if remainder.contains(brand.as_str()) {
                remainder = remainder.replacen(brand.as_str(), " ", 1);
            }
        }
        let rest: Vec<&str> = remainder.split_whitespace().collect();
        if rest.is_empty() {
            GuardVerdict::accept(GuardReason::Brand)
        } else if rest.iter().any(|t| COMMERCE_TOKENS.contains(t)) {
            GuardVerdict::accept(GuardReason::BrandCommerce)
        } else if rest.iter().all(|t| is_filler(t)) {
            GuardVerdict::reject(GuardReason::BrandWithGeneric)
        } else {
            GuardVerdict::accept(GuardReason::Brand)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Config;

    fn guard() -> KeywordGuard {
        KeywordGuard::new(&Config::default().categories["shaving"])
    }

    #[test]
    fn test_rejects_short_year_and_excluded() {
        let g = guard();
        assert_eq!(g.check("").reason, GuardReason::Empty);
        assert_eq!(g.check("ab").reason, GuardReason::TooShort);
        assert_eq!(g.check("best razor 2025").reason, GuardReason::YearToken);
        assert_eq!(g.check("razor for women").reason, GuardReason::ExcludedToken);
    }

    #[test]
    fn test_single_tokens_need_a_known_term() {
        let g = guard();
        assert_eq!(g.check("Razor").reason, GuardReason::HeadSingle);
        assert_eq!(g.check("gillette").reason, GuardReason::BrandSingle);
        assert_eq!(g.check("toaster").reason, GuardReason::UnknownSingleToken);
    }

    #[test]
    fn test_multi_token_rules() {
        let g = guard();
        assert_eq!(g.check("best price online").reason, GuardReason::GenericComposition);
        assert_eq!(g.check("electric shaver for beard").reason, GuardReason::HeadTerm);
        assert_eq!(g.check("philips norelco").reason, GuardReason::Brand);
        assert_eq!(g.check("philips price").reason, GuardReason::BrandCommerce);
        assert_eq!(g.check("philips india").reason, GuardReason::BrandWithGeneric);
        assert_eq!(g.check("kitchen mixer grinder").reason, GuardReason::NotCategorySpecific);
        assert!(g.is_specific("bombay shaving company"));
    }
}
