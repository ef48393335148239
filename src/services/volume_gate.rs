//! Rate-gated batch client for the keyword-volume provider.
//!
//! One `RateGate` is shared by every category in the process. It holds the
//! concurrency ceiling (a semaphore) and the per-minute request quota, and
//! keeps per-(surface, category, snapshot) counters for observability.

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::models::{normalize_keyword, CallError, FailureClass, ProviderConfig};
use crate::domain::ports::{ProviderSurface, VolumeProvider, VolumeRecord, VolumeRequest};
use crate::services::resilient_call::{run_step, TaskOptions};

/// Hard ceiling on keywords per volume request.
pub const MAX_BATCH_SIZE: usize = 700;

/// Observability key for gate counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GateKey {
    /// Provider surface
    pub surface: ProviderSurface,
    /// Category the request is for
    pub category_id: String,
    /// Snapshot the request is for
    pub snapshot_id: String,
}

impl GateKey {
    /// Key for one surface, category and snapshot
    pub fn new(surface: ProviderSurface, category_id: &str, snapshot_id: &str) -> Self {
        Self {
            surface,
            category_id: category_id.to_string(),
            snapshot_id: snapshot_id.to_string(),
        }
    }
}

/// Request counters for one gate key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GateCounters {
    /// Calls issued
    pub requests: u64,
    /// Keywords sent
    pub keywords: u64,
    /// Calls that failed
    pub failures: u64,
    /// Calls answered with nothing
    pub empty_responses: u64,
}

/// Process-wide limiter in front of the provider.
pub struct RateGate {
    permits: Semaphore,
    max_concurrent: usize,
    quota: Option<DefaultDirectRateLimiter>,
    counters: RwLock<HashMap<GateKey, GateCounters>>,
}

impl RateGate {
    /// `requests_per_minute = None` disables the quota and leaves only the
    /// concurrency ceiling.
    pub fn new(max_concurrent: usize, requests_per_minute: Option<NonZeroU32>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            quota: requests_per_minute.map(|rpm| RateLimiter::direct(Quota::per_minute(rpm))),
            counters: RwLock::new(HashMap::new()),
        }
    }

    /// A gate sized from the provider config
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(
            config.max_concurrent_requests,
            NonZeroU32::new(config.requests_per_minute),
        )
    }

    /// Concurrency ceiling
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Permits free right now
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `f` once capacity and quota allow. Waiting is abandoned on cancellation.
    pub async fn run<T, F, Fut>(
        &self,
        key: &GateKey,
        keywords: usize,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let _permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(CallError::cancelled("cancelled while waiting for provider capacity"));
            }
            permit = self.permits.acquire() => permit
                .map_err(|_| CallError::new(FailureClass::Offline, "provider gate closed"))?,
        };

        if let Some(quota) = &self.quota {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(CallError::cancelled("cancelled while waiting for provider quota"));
                }
                () = quota.until_ready() => {}
            }
        }

        let result = f().await;
        self.record(key, keywords, result.is_err()).await;
        result
    }

    async fn record(&self, key: &GateKey, keywords: usize, failed: bool) {
        let mut counters = self.counters.write().await;
        let entry = counters.entry(key.clone()).or_default();
        entry.requests += 1;
        entry.keywords += keywords as u64;
        if failed {
            entry.failures += 1;
        }
    }

    async fn record_empty(&self, key: &GateKey) {
        let mut counters = self.counters.write().await;
        counters.entry(key.clone()).or_default().empty_responses += 1;
    }

    /// Counters for one key
    pub async fn counters(&self, key: &GateKey) -> GateCounters {
        self.counters.read().await.get(key).copied().unwrap_or_default()
    }

    /// All counters, sorted by key.
    pub async fn snapshot(&self) -> Vec<(GateKey, GateCounters)> {
        let mut entries: Vec<_> = self
            .counters
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

/// Volumes resolved for one batch.
#[derive(Debug, Clone, Default)]
pub struct BatchLookup {
    /// Normalized keyword to record
    pub resolved: HashMap<String, VolumeRecord>,
    /// Normalized keywords the provider said nothing about
    pub missing: Vec<String>,
}

impl BatchLookup {
    /// True when nothing was resolved
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

/// Raised when the provider keeps answering with nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("provider returned no results for {0} consecutive batches")]
pub struct EmptyResults(pub u32);

/// Tracks consecutive empty batches within one validation run.
#[derive(Debug, Clone)]
pub struct EmptyBatchGuard {
    limit: u32,
    consecutive: u32,
}

impl EmptyBatchGuard {
    /// A guard tripping after `limit` consecutive empty batches
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    /// Record one batch. Errors once `limit` empty batches arrive in a row.
    pub fn observe(&mut self, empty: bool) -> Result<(), EmptyResults> {
        if empty {
            self.consecutive += 1;
            if self.consecutive >= self.limit {
                return Err(EmptyResults(self.consecutive));
            }
        } else {
            self.consecutive = 0;
        }
        Ok(())
    }
}

/// Provider client that routes every call through the shared gate and the
/// resilient call layer.
pub struct BatchVolumeClient {
    provider: Arc<dyn VolumeProvider>,
    gate: Arc<RateGate>,
    options: TaskOptions,
    batch_size: usize,
    location_code: u32,
    language_code: String,
}

impl BatchVolumeClient {
    /// A client sending through `gate` with the given retry options
    pub fn new(
        provider: Arc<dyn VolumeProvider>,
        gate: Arc<RateGate>,
        options: TaskOptions,
        config: &ProviderConfig,
    ) -> Self {
        Self {
            provider,
            gate,
            options,
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
            location_code: config.location_code,
            language_code: config.language_code.clone(),
        }
    }

    /// Keywords per batch, capped at the provider limit
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Shared rate gate
    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    fn request(&self, keywords: &[String]) -> VolumeRequest {
        VolumeRequest {
            keywords: keywords.to_vec(),
            location_code: self.location_code,
            language_code: self.language_code.clone(),
        }
    }

    /// Look up one batch of keywords.
    pub async fn lookup_volumes(
        &self,
        category_id: &str,
        snapshot_id: &str,
        keywords: &[String],
        cancel: &CancellationToken,
    ) -> Result<BatchLookup, CallError> {
        if keywords.len() > self.batch_size {
            return Err(CallError::new(
                FailureClass::ClientError(413),
                format!("batch of {} exceeds cap of {}", keywords.len(), self.batch_size),
            ));
        }

        let key = GateKey::new(ProviderSurface::SearchVolume, category_id, snapshot_id);
        let request = self.request(keywords);
        let step_id = format!("search_volume:{category_id}:{}", keywords.len());
        let records = run_step(&step_id, &self.options, cancel, |token| {
            let (key, request) = (&key, &request);
            async move {
                self.gate
                    .run(key, request.keywords.len(), &token, || self.provider.search_volume(request))
                    .await
            }
        })
        .await
        .into_result()?;

        let mut lookup = BatchLookup::default();
        for record in records {
            lookup.resolved.insert(normalize_keyword(&record.keyword), record);
        }
        lookup.missing = keywords
            .iter()
            .map(|k| normalize_keyword(k))
            .filter(|k| !lookup.resolved.contains_key(k))
            .collect();

        if lookup.is_empty() {
            self.gate.record_empty(&key).await;
            warn!(category_id, snapshot_id, batch = keywords.len(), "provider returned an empty batch");
        } else {
            debug!(
                category_id,
                snapshot_id,
                resolved = lookup.resolved.len(),
                missing = lookup.missing.len(),
                "batch resolved"
            );
        }
        Ok(lookup)
    }

    /// Ask the related-keywords surface for terms around `seeds`.
    pub async fn discover_related(
        &self,
        category_id: &str,
        snapshot_id: &str,
        seeds: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<VolumeRecord>, CallError> {
        let key = GateKey::new(ProviderSurface::RelatedKeywords, category_id, snapshot_id);
        let request = self.request(seeds);
        let step_id = format!("related_keywords:{category_id}:{}", seeds.len());
        run_step(&step_id, &self.options, cancel, |token| {
            let (key, request) = (&key, &request);
            async move {
                self.gate
                    .run(key, request.keywords.len(), &token, || self.provider.related_keywords(request))
                    .await
            }
        })
        .await
        .into_result()
    }
}
