//! Property tests for row bookkeeping and retry pacing.

use chrono::Utc;
use proptest::prelude::*;
use std::time::Duration;

use demand_corpus::domain::models::{keyword_id, normalize_keyword, CorpusCounts, KeywordRow, KeywordStatus};
use demand_corpus::services::resilient_call::{backoff_delay, backoff_floor};

/// `None` leaves the row unverified; `Some(v)` records a lookup of `v`.
fn rows_strategy() -> impl Strategy<Value = Vec<(Option<u64>, Option<u64>, bool)>> {
    prop::collection::vec(
        (
            prop::option::of(0u64..5_000),
            prop::option::of(0u64..5_000),
            any::<bool>(),
        ),
        0..60,
    )
}

fn build_rows(specs: &[(Option<u64>, Option<u64>, bool)]) -> Vec<KeywordRow> {
    let now = Utc::now();
    specs
        .iter()
        .enumerate()
        .map(|(i, (volume, secondary, prune))| {
            let mut row = KeywordRow::unverified(format!("razor {i}"), "Razors", "razors", now)
                .with_secondary_volume(*secondary);
            if let Some(v) = volume {
                row.record_volume(*v, None, None, now);
            }
            if *prune {
                row.prune();
            }
            row
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_counts_partition_the_corpus(specs in rows_strategy()) {
        let rows = build_rows(&specs);
        let counts = CorpusCounts::from_rows(&rows);
        prop_assert_eq!(counts.valid + counts.zero + counts.unverified, counts.total);
        prop_assert_eq!(counts.total, rows.len() as u64);
        prop_assert_eq!(counts.validated(), counts.valid + counts.zero);
        prop_assert!(rows.iter().all(KeywordRow::is_consistent));
    }

    #[test]
    fn prop_prune_is_idempotent(specs in rows_strategy()) {
        let mut rows = build_rows(&specs);
        for row in &mut rows {
            row.prune();
        }
        let once = rows.clone();
        for row in &mut rows {
            prop_assert!(!row.prune());
        }
        prop_assert_eq!(rows, once);
    }

    #[test]
    fn prop_pruned_rows_follow_their_signal(volume in 0u64..100, secondary in prop::option::of(0u64..100)) {
        let now = Utc::now();
        let mut row = KeywordRow::unverified("gillette razor", "Razors", "razors", now)
            .with_secondary_volume(secondary);
        row.record_volume(volume, None, None, now);
        row.prune();
        let positive = volume > 0 || secondary.unwrap_or(0) > 0;
        prop_assert_eq!(row.status == KeywordStatus::Valid, positive);
        prop_assert_eq!(row.active, positive);
    }

    #[test]
    fn prop_backoff_stays_within_jitter(base_ms in 1u64..2_000, attempt in 2u32..12, jitter_ms in 0u64..1_000) {
        let base = Duration::from_millis(base_ms);
        let jitter = Duration::from_millis(jitter_ms);
        let floor = backoff_floor(base, attempt);
        prop_assert_eq!(floor, base * (1u32 << (attempt - 2)));

        let delay = backoff_delay(base, attempt, jitter);
        prop_assert!(delay >= floor);
        prop_assert!(delay <= floor + jitter);
    }

    #[test]
    fn prop_normalization_is_stable(raw in "[A-Za-z0-9 &/.,'-]{0,40}") {
        let once = normalize_keyword(&raw);
        prop_assert_eq!(normalize_keyword(&once), once.clone());
        prop_assert!(!once.starts_with(' ') && !once.ends_with(' ') && !once.contains("  "));
        prop_assert_eq!(keyword_id(&once, "razors"), keyword_id(&normalize_keyword(&raw), "razors"));
    }
}
