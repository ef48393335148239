//! Structured logging with tracing: env-filtered console output plus an
//! optional rolling JSON file.

/// Subscriber setup for console and file output
pub mod logger;

pub use logger::{LogFormat, LoggerImpl, RotationPolicy};
