use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the corpus pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults for the resilient call layer
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Keyword-volume provider and its shared gate
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Growth loop tuning
    #[serde(default)]
    pub growth: GrowthConfig,

    /// Job register liveness settings
    #[serde(default)]
    pub jobs: JobsConfig,

    /// Certification thresholds
    #[serde(default)]
    pub certification: CertificationConfig,

    /// Per-category dictionaries, keyed by category id
    #[serde(default = "default_categories")]
    pub categories: BTreeMap<String, CategoryDictionary>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            resilience: ResilienceConfig::default(),
            provider: ProviderConfig::default(),
            growth: GrowthConfig::default(),
            jobs: JobsConfig::default(),
            certification: CertificationConfig::default(),
            categories: default_categories(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".demand-corpus/corpus.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file output: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Also log to stdout when a log directory is set
    #[serde(default = "default_true")]
    pub enable_stdout: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_stdout: true,
        }
    }
}

/// Resilient call defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResilienceConfig {
    /// Hard per-attempt timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound of the additive uniform jitter
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,

    /// Skip remaining steps once one fails
    #[serde(default = "default_true")]
    pub abort_on_chain_failure: bool,
}

const fn default_timeout_ms() -> u64 {
    120_000
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_base_delay_ms() -> u64 {
    1_000
}

const fn default_jitter_max_ms() -> u64 {
    500
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            abort_on_chain_failure: true,
        }
    }
}

/// External keyword-volume provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProviderConfig {
    /// Forwarding endpoint every provider request is routed through
    #[serde(default = "default_egress_url")]
    pub egress_url: String,

    /// Basic-auth login injected at egress
    #[serde(default)]
    pub login: Option<String>,

    /// Basic-auth password injected at egress
    #[serde(default)]
    pub password: Option<String>,

    /// Shared secret for the forwarding endpoint
    #[serde(default)]
    pub proxy_key: Option<String>,

    /// Provider location code for the market
    #[serde(default = "default_location_code")]
    pub location_code: u32,

    /// Provider language code for the market
    #[serde(default = "default_language_code")]
    pub language_code: String,

    /// Country label used in corpus keys
    #[serde(default = "default_country")]
    pub country: String,

    /// Keywords per volume request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Global in-flight request ceiling across all categories
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Global request quota per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

fn default_egress_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

const fn default_location_code() -> u32 {
    2356
}

fn default_language_code() -> String {
    "en".to_string()
}

fn default_country() -> String {
    "IN".to_string()
}

const fn default_batch_size() -> usize {
    500
}

const fn default_max_concurrent_requests() -> usize {
    4
}

const fn default_requests_per_minute() -> u32 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            egress_url: default_egress_url(),
            login: None,
            password: None,
            proxy_key: None,
            location_code: default_location_code(),
            language_code: default_language_code(),
            country: default_country(),
            batch_size: default_batch_size(),
            max_concurrent_requests: default_max_concurrent_requests(),
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

/// Growth loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct GrowthConfig {
    /// Upper bound on passes per growth run
    pub max_attempts: u32,
    /// Valid-count target when none is given
    pub default_target_valid: u64,
    /// Valid rows each anchor should reach before generation skips it
    pub target_per_anchor: u64,
    /// Candidates generated per missing valid row
    pub candidate_multiplier: u64,
    /// Smallest candidate budget for an anchor below target
    pub min_candidates_per_anchor: u64,
    /// Largest candidate budget for an anchor below target
    pub max_candidates_per_anchor: u64,
    /// Cap on new candidates per pass
    pub candidate_cap: usize,
    /// Discovery runs when template output is below this
    pub discovery_min_candidates: usize,
    /// Discovery only runs in the first N passes
    pub discovery_passes: u32,
    /// Seeds sent to the related-keywords surface per pass
    pub discovery_seeds_per_pass: usize,
    /// Consecutive empty batches before the run aborts
    pub empty_batch_limit: u32,
    /// Concurrent anchor-level work items
    pub anchor_concurrency: usize,
    /// Concurrent category-level operations
    pub category_concurrency: usize,
    /// Pause between passes
    pub pass_delay_ms: u64,
    /// Valid count that promotes a fully validated snapshot to VALIDATED_LITE
    pub lite_promotion_valid: u64,
    /// Rebuild growth target for the FULL tier
    pub rebuild_target_full: u64,
    /// Rebuild growth target for the LITE tier
    pub rebuild_target_lite: u64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            max_attempts: 12,
            default_target_valid: 600,
            target_per_anchor: 40,
            candidate_multiplier: 6,
            min_candidates_per_anchor: 250,
            max_candidates_per_anchor: 1000,
            candidate_cap: 5000,
            discovery_min_candidates: 200,
            discovery_passes: 2,
            discovery_seeds_per_pass: 20,
            empty_batch_limit: 2,
            anchor_concurrency: 3,
            category_concurrency: 2,
            pass_delay_ms: 500,
            lite_promotion_valid: 300,
            rebuild_target_full: 300,
            rebuild_target_lite: 100,
        }
    }
}

/// Job register liveness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JobsConfig {
    /// Heartbeat period while work is in flight
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Idle time after which a job is reported as stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Idle time after which a non-terminal job is reaped
    #[serde(default = "default_zombie_after_secs")]
    pub zombie_after_secs: u64,
}

const fn default_heartbeat_interval_ms() -> u64 {
    3_000
}

const fn default_stale_after_secs() -> u64 {
    60
}

const fn default_zombie_after_secs() -> u64 {
    180
}

impl JobsConfig {
    /// Heartbeat period as a `Duration`
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            stale_after_secs: default_stale_after_secs(),
            zombie_after_secs: default_zombie_after_secs(),
        }
    }
}

/// Thresholds for one tier of the standard multi-gate profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StandardThresholds {
    /// Gate A: anchors that must pass
    pub min_anchors_passing: usize,
    /// Gate A: valid rows an anchor needs
    pub anchor_min_valid: u64,
    /// Gate A: head volume an anchor needs
    pub anchor_min_head_volume: u64,
    /// Gate B: valid / total floor
    pub min_coverage: f64,
    /// Gate C: zero / total ceiling
    pub max_zero_ratio: f64,
    /// Gate E: absolute valid floor
    pub min_valid: u64,
}

impl StandardThresholds {
    /// Default FULL thresholds
    pub const fn full() -> Self {
        Self {
            min_anchors_passing: 10,
            anchor_min_valid: 20,
            anchor_min_head_volume: 1_000,
            min_coverage: 0.35,
            max_zero_ratio: 0.65,
            min_valid: 600,
        }
    }

    /// Default LITE thresholds
    pub const fn lite() -> Self {
        Self {
            min_anchors_passing: 3,
            anchor_min_valid: 10,
            anchor_min_head_volume: 500,
            min_coverage: 0.15,
            max_zero_ratio: 0.85,
            min_valid: 150,
        }
    }
}

/// Thresholds for one tier of the lean rebuild profile. Percentages are 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LeanThresholds {
    /// Anchors that must meet `lean_anchor_min_valid`
    pub min_anchors_passing: usize,
    /// Valid share floor, in percent
    pub min_coverage_pct: f64,
    /// Absolute valid floor
    pub min_valid: u64,
    /// Zero share ceiling, in percent
    pub max_zero_pct: f64,
}

impl LeanThresholds {
    /// Default lean FULL thresholds
    pub const fn full() -> Self {
        Self {
            min_anchors_passing: 2,
            min_coverage_pct: 3.0,
            min_valid: 20,
            max_zero_pct: 98.0,
        }
    }

    /// Default lean LITE thresholds
    pub const fn lite() -> Self {
        Self {
            min_anchors_passing: 1,
            min_coverage_pct: 1.0,
            min_valid: 5,
            max_zero_pct: 99.0,
        }
    }
}

/// Certification thresholds for both policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CertificationConfig {
    /// Standard profile, FULL tier
    pub standard_full: StandardThresholds,
    /// Standard profile, LITE tier
    pub standard_lite: StandardThresholds,
    /// Valid rows an anchor needs to count as passing under the lean profile
    pub lean_anchor_min_valid: u64,
    /// Lean profile, FULL tier
    pub lean_full: LeanThresholds,
    /// Lean profile, LITE tier
    pub lean_lite: LeanThresholds,
}

impl Default for CertificationConfig {
    fn default() -> Self {
        Self {
            standard_full: StandardThresholds::full(),
            standard_lite: StandardThresholds::lite(),
            lean_anchor_min_valid: 2,
            lean_full: LeanThresholds::full(),
            lean_lite: LeanThresholds::lite(),
        }
    }
}

/// Seed vocabulary for one category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CategoryDictionary {
    /// Anchor names drafted into new snapshots
    pub anchors: Vec<String>,
    /// Terms that make a keyword category-specific
    pub head_terms: Vec<String>,
    /// Brand names combined with head terms by the generator
    pub brands: Vec<String>,
    /// Seeds for the related-keywords surface; head terms when empty
    pub discovery_seeds: Vec<String>,
    /// Tokens that disqualify a keyword outright
    pub excluded_tokens: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

const DEFAULT_EXCLUDED_TOKENS: &[&str] = &[
    "women", "womens", "woman", "female", "ladies", "girl", "girls", "bridal", "bride",
    "maternity", "pregnancy", "makeup", "lipstick", "mascara", "eyeliner", "lingerie",
];

fn default_categories() -> BTreeMap<String, CategoryDictionary> {
    let mut categories = BTreeMap::new();
    categories.insert(
        "shaving".to_string(),
        CategoryDictionary {
            anchors: strings(&[
                "Razors & Blades",
                "Electric Shavers",
                "Trimmers",
                "Shaving Foam & Gel",
                "Aftershave Care",
                "Safety Razor Kits",
            ]),
            head_terms: strings(&[
                "shaving", "shave", "razor", "blade", "cartridge", "trimmer", "foam", "gel", "cream",
                "lather", "safety razor", "electric shaver", "aftershave", "pre shave",
            ]),
            brands: strings(&[
                "gillette", "philips", "panasonic", "syska", "braun", "havells",
                "bombay shaving company", "beardo", "the man company", "park avenue", "supermax",
                "denver", "old spice", "ustraa",
            ]),
            discovery_seeds: strings(&[
                "razor burn remedy",
                "ingrown hair after shaving",
                "how to shave without cuts",
                "shaving rash treatment",
                "smooth shave tips",
            ]),
            excluded_tokens: strings(DEFAULT_EXCLUDED_TOKENS),
        },
    );
    categories.insert(
        "oral-care".to_string(),
        CategoryDictionary {
            anchors: strings(&[
                "Toothpaste",
                "Toothbrush",
                "Mouthwash & Breath",
                "Teeth Whitening",
                "Gum Care",
                "Floss",
            ]),
            head_terms: strings(&[
                "toothpaste", "toothbrush", "mouthwash", "floss", "breath", "whitening", "gum",
                "tooth brush", "oral care", "fresh breath",
            ]),
            brands: strings(&[
                "colgate", "pepsodent", "closeup", "sensodyne", "oral b", "dabur red", "patanjali",
                "vicco", "meswak", "himalaya", "listerine",
            ]),
            discovery_seeds: strings(&[
                "teeth whitening at home",
                "best electric toothbrush india",
                "sensitive teeth toothpaste",
                "mouthwash for bad breath",
            ]),
            excluded_tokens: strings(DEFAULT_EXCLUDED_TOKENS),
        },
    );
    categories
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resilience_defaults() {
        let r = ResilienceConfig::default();
        assert_eq!(r.timeout_ms, 120_000);
        assert_eq!(r.max_retries, 2);
        assert_eq!(r.base_delay_ms, 1_000);
        assert_eq!(r.jitter_max_ms, 500);
        assert!(r.abort_on_chain_failure);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r"
growth:
  max_attempts: 5
jobs:
  zombie_after_secs: 240
";
        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert_eq!(config.growth.max_attempts, 5);
        assert_eq!(config.growth.candidate_cap, 5000);
        assert_eq!(config.jobs.zombie_after_secs, 240);
        assert_eq!(config.jobs.heartbeat_interval_ms, 3_000);
        assert!(config.categories.contains_key("shaving"));
    }

    #[test]
    fn test_default_categories_have_six_anchors() {
        let config = Config::default();
        for dict in config.categories.values() {
            assert_eq!(dict.anchors.len(), 6);
            assert!(!dict.head_terms.is_empty());
        }
    }
}
