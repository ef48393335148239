//! HTTP keyword-volume provider routed through the egress forwarder.
//!
//! Requests are posted as a one-task array; credentials and the forwarder key
//! are attached here so nothing upstream handles secrets. The client applies
//! no retries of its own: classification feeds the resilient call layer.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::models::{CallError, FailureClass, ProviderConfig};
use crate::domain::ports::{VolumeProvider, VolumeRecord, VolumeRequest};

const SEARCH_VOLUME_PATH: &str = "v3/keywords_data/google_ads/search_volume/live";
const RELATED_KEYWORDS_PATH: &str = "v3/keywords_data/google_ads/keywords_for_keywords/live";
const PROXY_KEY_HEADER: &str = "x-proxy-key";
const TASK_OK: u32 = 20000;

#[derive(Serialize)]
struct SearchVolumeTask<'a> {
    keywords: &'a [String],
    location_code: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct RelatedKeywordsTask<'a> {
    keys: &'a [String],
    location_code: u32,
    language_code: &'a str,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    tasks: Vec<ProviderTask>,
}

#[derive(Debug, Deserialize)]
struct ProviderTask {
    status_code: Option<u32>,
    status_message: Option<String>,
    #[serde(default)]
    result: Option<Vec<ResultEntry>>,
}

/// Either a keyword row or a wrapper holding `items`, depending on surface.
#[derive(Debug, Deserialize)]
struct ResultEntry {
    keyword: Option<String>,
    search_volume: Option<u64>,
    cpc: Option<f64>,
    competition_index: Option<f64>,
    #[serde(default)]
    items: Option<Vec<ResultEntry>>,
}

impl ResultEntry {
    fn collect_into(self, out: &mut Vec<VolumeRecord>) {
        if let Some(keyword) = self.keyword {
            out.push(VolumeRecord {
                keyword,
                // the provider reports null for keywords it tracks with no volume
                volume: self.search_volume.unwrap_or(0),
                cpc: self.cpc,
                competition_index: self.competition_index,
            });
        }
        for item in self.items.into_iter().flatten() {
            item.collect_into(out);
        }
    }
}

/// Classify a provider task status such as `40501` or `50000`.
fn task_failure(code: u32) -> FailureClass {
    FailureClass::from_status(u16::try_from(code / 100).unwrap_or(500))
}

fn request_failure(err: &reqwest::Error) -> CallError {
    if err.is_timeout() {
        CallError::new(FailureClass::Timeout, err.to_string())
    } else if err.is_decode() {
        CallError::parse(err.to_string())
    } else {
        CallError::network(err.to_string())
    }
}

/// Volume provider calling the keyword-data API through the egress endpoint
pub struct HttpVolumeProvider {
    client: Client,
    base_url: String,
    login: Option<String>,
    password: Option<String>,
    proxy_key: Option<String>,
}

impl HttpVolumeProvider {
    /// Build a client from the provider config
    pub fn new(config: &ProviderConfig) -> Result<Self, CallError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(config.max_concurrent_requests.max(1))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| CallError::network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.egress_url.trim_end_matches('/').to_string(),
            login: config.login.clone(),
            password: config.password.clone(),
            proxy_key: config.proxy_key.clone(),
        })
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, task: &B) -> Result<Vec<VolumeRecord>, CallError> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.client.post(&url).json(&[task]);
        if let Some(login) = &self.login {
            request = request.basic_auth(login, self.password.as_deref());
        }
        if let Some(key) = &self.proxy_key {
            request = request.header(PROXY_KEY_HEADER, key);
        }

        let response = request.send().await.map_err(|e| request_failure(&e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::new(
                FailureClass::from_status(status.as_u16()),
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
            ));
        }

        let body = response.bytes().await.map_err(|e| request_failure(&e))?;
        let parsed: ProviderResponse =
            serde_json::from_slice(&body).map_err(|e| CallError::parse(format!("invalid provider response: {e}")))?;
        Self::records(parsed, status)
    }

    fn records(response: ProviderResponse, status: StatusCode) -> Result<Vec<VolumeRecord>, CallError> {
        let Some(task) = response.tasks.into_iter().next() else {
            return Err(CallError::parse(format!("provider response ({status}) has no tasks")));
        };
        if let Some(code) = task.status_code.filter(|c| *c != TASK_OK) {
            return Err(CallError::new(
                task_failure(code),
                format!("provider task {code}: {}", task.status_message.unwrap_or_default()),
            ));
        }

        let mut records = Vec::new();
        for entry in task.result.into_iter().flatten() {
            entry.collect_into(&mut records);
        }
        debug!(records = records.len(), "provider response decoded");
        Ok(records)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl VolumeProvider for HttpVolumeProvider {
    async fn search_volume(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError> {
        let task = SearchVolumeTask {
            keywords: &request.keywords,
            location_code: request.location_code,
            language_code: &request.language_code,
        };
        self.post(SEARCH_VOLUME_PATH, &task).await
    }

    async fn related_keywords(&self, request: &VolumeRequest) -> Result<Vec<VolumeRecord>, CallError> {
        let task = RelatedKeywordsTask {
            keys: &request.keywords,
            location_code: request.location_code,
            language_code: &request.language_code,
        };
        self.post(RELATED_KEYWORDS_PATH, &task).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_classification() {
        assert_eq!(task_failure(40501), FailureClass::ClientError(405));
        assert_eq!(task_failure(50000), FailureClass::ServerError(500));
        assert_eq!(task_failure(42900), FailureClass::RateLimited);
    }

    #[test]
    fn test_nested_items_and_null_volume() {
        let response: ProviderResponse = serde_json::from_str(
            r#"{"tasks":[{"status_code":20000,"result":[
                {"items":[{"keyword":"razor bumps cream","search_volume":880},
                          {"keyword":"razor rash","search_volume":null}]}
            ]}]}"#,
        )
        .unwrap();
        let records = HttpVolumeProvider::records(response, StatusCode::OK).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].volume, 0);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
