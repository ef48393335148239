use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::services::volume_gate::MAX_BATCH_SIZE;

/// Project-local configuration directory
pub const CONFIG_DIR: &str = ".demand-corpus";
/// Prefix for environment overrides; `__` separates nested keys
pub const ENV_PREFIX: &str = "DEMAND_CORPUS_";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Log level outside the supported set
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Log format other than json or pretty
    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    /// Rotation other than daily, hourly or never
    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    /// Empty database path
    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    /// A pool with no connections
    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    /// Batch size outside the provider limit
    #[error("Invalid batch_size: {0}. Must be between 1 and {MAX_BATCH_SIZE}")]
    InvalidBatchSize(usize),

    /// A setting that must be at least 1
    #[error("Invalid {field}: must be at least 1")]
    ZeroValue {
        /// Dotted config path
        field: &'static str,
    },

    /// Stale threshold not below the zombie threshold
    #[error("Invalid job liveness: stale_after_secs ({stale}) must be below zombie_after_secs ({zombie})")]
    InvalidLiveness {
        /// Configured stale threshold, seconds
        stale: u64,
        /// Configured zombie threshold, seconds
        zombie: u64,
    },

    /// A ratio outside 0..=1
    #[error("Invalid {field}: {value} is not a ratio between 0 and 1")]
    InvalidRatio {
        /// Dotted config path
        field: &'static str,
        /// Rejected value
        value: f64,
    },

    /// A category with no anchors
    #[error("Category {0} has no anchors")]
    EmptyCategory(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.demand-corpus/config.yaml`, or `path` when given
    /// 3. `.demand-corpus/local.yaml` (optional overrides)
    /// 4. `DEMAND_CORPUS_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let base = path.map_or_else(|| PathBuf::from(CONFIG_DIR).join("config.yaml"), Path::to_path_buf);
        let config: Config = Self::figment(&base)
            .extract()
            .with_context(|| format!("Failed to load configuration (base file {})", base.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment(base: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base))
            .merge(Yaml::file(PathBuf::from(CONFIG_DIR).join("local.yaml")))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        if !["json", "pretty"].contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        if !["daily", "hourly", "never"].contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let provider = &config.provider;
        if provider.batch_size == 0 || provider.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::InvalidBatchSize(provider.batch_size));
        }
        let non_zero = [
            ("resilience.timeout_ms", config.resilience.timeout_ms),
            ("provider.max_concurrent_requests", provider.max_concurrent_requests as u64),
            ("growth.max_attempts", u64::from(config.growth.max_attempts)),
            ("growth.anchor_concurrency", config.growth.anchor_concurrency as u64),
            ("growth.category_concurrency", config.growth.category_concurrency as u64),
            ("growth.empty_batch_limit", u64::from(config.growth.empty_batch_limit)),
            ("jobs.heartbeat_interval_ms", config.jobs.heartbeat_interval_ms),
            ("certification.standard_full.min_valid", config.certification.standard_full.min_valid),
            ("certification.standard_lite.min_valid", config.certification.standard_lite.min_valid),
            ("certification.lean_full.min_valid", config.certification.lean_full.min_valid),
            ("certification.lean_lite.min_valid", config.certification.lean_lite.min_valid),
        ];
        if let Some((field, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroValue { field: *field });
        }

        if config.jobs.stale_after_secs >= config.jobs.zombie_after_secs {
            return Err(ConfigError::InvalidLiveness {
                stale: config.jobs.stale_after_secs,
                zombie: config.jobs.zombie_after_secs,
            });
        }

        let ratios = [
            ("certification.standard_full.min_coverage", config.certification.standard_full.min_coverage),
            ("certification.standard_full.max_zero_ratio", config.certification.standard_full.max_zero_ratio),
            ("certification.standard_lite.min_coverage", config.certification.standard_lite.min_coverage),
            ("certification.standard_lite.max_zero_ratio", config.certification.standard_lite.max_zero_ratio),
        ];
        if let Some((field, value)) = ratios.iter().find(|(_, v)| !(0.0..=1.0).contains(v)) {
            return Err(ConfigError::InvalidRatio { field: *field, value: *value });
        }

        if let Some((id, _)) = config.categories.iter().find(|(_, d)| d.anchors.is_empty()) {
            return Err(ConfigError::EmptyCategory(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.database.path, ".demand-corpus/corpus.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "verbose"),
            other => panic!("Expected InvalidLogLevel error, got {other}"),
        }
    }

    #[test]
    fn test_validate_batch_size_ceiling() {
        let mut config = Config::default();
        config.provider.batch_size = 701;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBatchSize(701)
        ));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.growth.anchor_concurrency = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroValue {
                field: "growth.anchor_concurrency"
            }
        ));
    }

    #[test]
    fn test_validate_rejects_zero_valid_floor() {
        let mut config = Config::default();
        config.certification.standard_lite.min_valid = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroValue {
                field: "certification.standard_lite.min_valid"
            }
        ));
    }

    #[test]
    fn test_validate_liveness_order() {
        let mut config = Config::default();
        config.jobs.stale_after_secs = 300;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLiveness { stale: 300, zombie: 180 }
        ));
    }

    #[test]
    fn test_validate_ratio_bounds() {
        let mut config = Config::default();
        config.certification.standard_full.min_coverage = 35.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRatio { .. }
        ));
    }

    #[test]
    fn test_file_then_env_precedence() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "growth:\n  max_attempts: 5\n  anchor_concurrency: 2\nlogging:\n  format: json").unwrap();
        file.flush().unwrap();

        temp_env::with_vars(
            [
                ("DEMAND_CORPUS_GROWTH__MAX_ATTEMPTS", Some("7")),
                ("DEMAND_CORPUS_PROVIDER__LOGIN", Some("ops@example.com")),
            ],
            || {
                let config = ConfigLoader::load(Some(file.path())).unwrap();
                assert_eq!(config.growth.max_attempts, 7, "env wins over file");
                assert_eq!(config.growth.anchor_concurrency, 2, "file wins over defaults");
                assert_eq!(config.growth.candidate_cap, 5000);
                assert_eq!(config.logging.format, "json");
                assert_eq!(config.provider.login.as_deref(), Some("ops@example.com"));
            },
        );
    }

    #[test]
    fn test_invalid_env_value_is_rejected() {
        temp_env::with_var("DEMAND_CORPUS_LOGGING__LEVEL", Some("loud"), || {
            assert!(ConfigLoader::load(Some(Path::new("does-not-exist.yaml"))).is_err());
        });
    }
}
