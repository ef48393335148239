//! Fixture-backed volume provider.
//!
//! Answers from a fixed keyword table. Used for dry runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::models::{normalize_keyword, CallError};
use crate::domain::ports::{VolumeProvider, VolumeRecord, VolumeRequest};

/// Volume rule for keywords not in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownKeywords {
    /// Leave them out of the response
    Omit,
    /// Report them with this volume
    Volume(u64),
}

/// Volume provider answering from a fixed keyword table
pub struct FixtureVolumeProvider {
    volumes: HashMap<String, u64>,
    related: HashMap<String, Vec<(String, u64)>>,
    unknown: UnknownKeywords,
    volume_calls: AtomicU64,
    related_calls: AtomicU64,
}

impl FixtureVolumeProvider {
    /// A provider with an empty table
    pub fn new(unknown: UnknownKeywords) -> Self {
        Self {
            volumes: HashMap::new(),
            related: HashMap::new(),
            unknown,
            volume_calls: AtomicU64::new(0),
            related_calls: AtomicU64::new(0),
        }
    }

    /// Add a fixed volume for one keyword
    #[must_use]
    pub fn with_volume(mut self, keyword: &str, volume: u64) -> Self {
        self.volumes.insert(normalize_keyword(keyword), volume);
        self
    }

    /// Add related terms returned for one seed
    #[must_use]
    pub fn with_related(mut self, seed: &str, terms: &[(&str, u64)]) -> Self {
        self.related.insert(
            normalize_keyword(seed),
            terms.iter().map(|(t, v)| ((*t).to_string(), *v)).collect(),
        );
        self
    }

    /// Search volume calls received
    pub fn volume_calls(&self) -> u64 {
        self.volume_calls.load(Ordering::SeqCst)
    }

    /// Related keyword calls received
    pub fn related_calls(&self) -> u64 {
        self.related_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeProvider for FixtureVolumeProvider {
    async fn search_volume(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError> {
        self.volume_calls.fetch_add(1, Ordering::SeqCst);
        Ok(request
            .keywords
            .iter()
            .filter_map(|keyword| {
                let volume = match (self.volumes.get(&normalize_keyword(keyword)), self.unknown) {
                    (Some(&v), _) | (None, UnknownKeywords::Volume(v)) => v,
                    (None, UnknownKeywords::Omit) => return None,
                };
                Some(VolumeRecord {
                    keyword: keyword.clone(),
                    volume,
                    cpc: None,
                    competition_index: None,
                })
            })
            .collect())
    }

    async fn related_keywords(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError> {
        self.related_calls.fetch_add(1, Ordering::SeqCst);
        Ok(request
            .keywords
            .iter()
            .filter_map(|seed| self.related.get(&normalize_keyword(seed)))
            .flatten()
            .map(|(keyword, volume)| VolumeRecord {
                keyword: keyword.clone(),
                volume: *volume,
                cpc: None,
                competition_index: None,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(keywords: &[&str]) -> VolumeRequest {
        VolumeRequest {
            keywords: keywords.iter().map(|k| (*k).to_string()).collect(),
            location_code: 2356,
            language_code: "en".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_keywords_are_omitted_or_defaulted() {
        let omit = FixtureVolumeProvider::new(UnknownKeywords::Omit).with_volume("gillette razor", 900);
        let records = omit.search_volume(&request(&["Gillette Razor", "mystery"])).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].volume, 900);

        let zero = FixtureVolumeProvider::new(UnknownKeywords::Volume(0));
        let records = zero.search_volume(&request(&["mystery"])).await.unwrap();
        assert_eq!(records[0].volume, 0);
        assert_eq!(zero.volume_calls(), 1);
    }
}
