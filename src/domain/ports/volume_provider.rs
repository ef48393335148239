use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::CallError;

/// Which provider surface a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSurface {
    /// Batch search volume lookup
    SearchVolume,
    /// Related keywords for seed terms
    RelatedKeywords,
}

impl ProviderSurface {
    /// Stable name used in gate keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SearchVolume => "search_volume",
            Self::RelatedKeywords => "related_keywords",
        }
    }
}

/// Batch lookup request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRequest {
    /// Keywords or seeds in this call
    pub keywords: Vec<String>,
    /// Provider location code for the market
    pub location_code: u32,
    /// Provider language code for the market
    pub language_code: String,
}

/// One keyword with its metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Keyword as the provider returned it
    pub keyword: String,
    /// Monthly search volume; missing volumes decode as 0
    pub volume: u64,
    /// Cost per click, if reported
    pub cpc: Option<f64>,
    /// Competition index, if reported
    pub competition_index: Option<f64>,
}

/// External keyword-volume API.
///
/// Keywords missing from a response mean "no data", never zero.
#[async_trait]
pub trait VolumeProvider: Send + Sync {
    /// Look up volumes for a batch of keywords
    async fn search_volume(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError>;

    /// Discover related keywords, with volumes attached, for seed terms
    async fn related_keywords(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError>;
}
