//! Anchor assignment for generated keywords.
//!
//! Pure and deterministic: the same keyword and anchor list always land on
//! the same anchor.

use serde::Serialize;

use crate::domain::models::{normalize_keyword, Anchor, IntentBucket};

/// Which rule placed the keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRule {
    /// Keyword shares a name token with the anchor
    TokenOverlap,
    /// Anchor chosen by the keyword's intent bucket
    Intent,
    /// Fallback: stable hash modulo anchor count
    Hash,
}

/// Anchor chosen for a keyword and the rule that chose it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Assignment {
    /// Anchor the keyword belongs to
    pub anchor_id: String,
    /// Rule that decided
    pub rule: AssignmentRule,
}

/// 31-multiplier rolling hash over UTF-16 code units, wrapping at 32 bits.
pub fn keyword_hash(text: &str) -> i32 {
    text.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_shl(5).wrapping_sub(h).wrapping_add(i32::from(unit)))
}

/// Pick an anchor for `keyword`. `None` only when there are no anchors.
///
/// Rules, first match wins: an anchor name token (longer than three chars)
/// appears in the keyword; decision or consideration intent goes to the first
/// anchor and problem intent to the second; otherwise the keyword hash modulo
/// the anchor count.
pub fn assign_anchor(keyword: &str, anchors: &[Anchor]) -> Option<Assignment> {
    let first = anchors.first()?;
    let text = normalize_keyword(keyword);

    for anchor in anchors {
        if anchor.tokens().iter().any(|token| text.contains(token.as_str())) {
            return Some(Assignment {
                anchor_id: anchor.id.clone(),
                rule: AssignmentRule::TokenOverlap,
            });
        }
    }

    let by_intent = match IntentBucket::infer(&text) {
        IntentBucket::Decision | IntentBucket::Consideration => Some(first),
        IntentBucket::Problem => anchors.get(1).or(Some(first)),
        IntentBucket::Discovery => None,
    };
    if let Some(anchor) = by_intent {
        return Some(Assignment {
            anchor_id: anchor.id.clone(),
            rule: AssignmentRule::Intent,
        });
    }

    let index = i64::from(keyword_hash(&text)).unsigned_abs() % anchors.len() as u64;
    let anchor = usize::try_from(index).ok().and_then(|i| anchors.get(i)).unwrap_or(first);
    Some(Assignment {
        anchor_id: anchor.id.clone(),
        rule: AssignmentRule::Hash,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn anchors() -> Vec<Anchor> {
        ["Razors & Blades", "Electric Shavers", "Trimmers", "Aftershave Care"]
            .iter()
            .enumerate()
            .map(|(i, name)| Anchor::scan(*name, i as u32))
            .collect()
    }

    #[test]
    fn test_token_overlap_wins() {
        let a = assign_anchor("beard trimmers under 1000", &anchors()).unwrap();
        assert_eq!(a.anchor_id, "Trimmers");
        assert_eq!(a.rule, AssignmentRule::TokenOverlap);
    }

    #[test]
    fn test_intent_fallback() {
        let decision = assign_anchor("gillette buy online", &anchors()).unwrap();
        assert_eq!((decision.anchor_id.as_str(), decision.rule), ("Razors & Blades", AssignmentRule::Intent));

        let problem = assign_anchor("neck irritation", &anchors()).unwrap();
        assert_eq!(problem.anchor_id, "Electric Shavers");

        let single = vec![Anchor::scan("Everything", 0)];
        assert_eq!(assign_anchor("neck irritation", &single).unwrap().anchor_id, "Everything");
    }

    #[test]
    fn test_hash_fallback_and_empty_anchor_list() {
        let a = assign_anchor("gillette mach3", &anchors()).unwrap();
        assert_eq!(a.rule, AssignmentRule::Hash);
        assert!(assign_anchor("gillette mach3", &[]).is_none());
    }

    #[test]
    fn test_keyword_hash_matches_rolling_formula() {
        assert_eq!(keyword_hash(""), 0);
        assert_eq!(keyword_hash("a"), 97);
        assert_eq!(keyword_hash("ab"), 97 * 31 + 98);
    }

    proptest! {
        #[test]
        fn prop_assignment_is_deterministic_and_total(keyword in "[a-z0-9 ]{0,40}") {
            let anchors = anchors();
            let first = assign_anchor(&keyword, &anchors).unwrap();
            let second = assign_anchor(&keyword, &anchors).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert!(anchors.iter().any(|a| a.id == first.anchor_id));
        }
    }
}
