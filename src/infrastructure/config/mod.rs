//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment: defaults, YAML files and
//! environment overrides, validated after extraction.

/// Layered configuration loading and validation
pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_DIR, ENV_PREFIX};
