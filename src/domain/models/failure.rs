//! Failure classification for external calls.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Why an external call failed. Drives the retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "class", content = "status")]
pub enum FailureClass {
    /// The per-attempt hard timeout fired
    Timeout,
    /// Connection-level failure
    Network,
    /// HTTP 5xx
    ServerError(u16),
    /// HTTP 429
    RateLimited,
    /// HTTP 4xx other than 429
    ClientError(u16),
    /// External cancellation signal
    Cancelled,
    /// Response could not be decoded
    Parse,
    /// Provider explicitly reported it is unavailable
    Offline,
}

impl FailureClass {
    /// Transient classes are retried with backoff; everything else is terminal.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Network | Self::ServerError(_) | Self::RateLimited
        )
    }

    /// Classify a non-success HTTP status.
    pub const fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            500..=599 => Self::ServerError(status),
            _ => Self::ClientError(status),
        }
    }

    /// Short stable name for logs and stored messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::ServerError(_) => "server_error",
            Self::RateLimited => "rate_limited",
            Self::ClientError(_) => "client_error",
            Self::Cancelled => "cancelled",
            Self::Parse => "parse",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerError(code) | Self::ClientError(code) => write!(f, "{} ({code})", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Error returned by an external call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{class}: {message}")]
pub struct CallError {
    /// Failure classification
    pub class: FailureClass,
    /// Human-readable detail
    pub message: String,
}

impl CallError {
    /// Build an error from a class and message
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// An attempt that hit its hard timeout
    pub fn timeout(after: Duration) -> Self {
        Self::new(FailureClass::Timeout, format!("timed out after {}ms", after.as_millis()))
    }

    /// A call abandoned because its token was cancelled
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Cancelled, message)
    }

    /// A connection-level failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Network, message)
    }

    /// A response that could not be decoded
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Parse, message)
    }

    /// Whether the call may be retried
    pub const fn is_transient(&self) -> bool {
        self.class.is_transient()
    }

    /// Whether the call was cancelled
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.class, FailureClass::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classes() {
        assert!(FailureClass::Timeout.is_transient());
        assert!(FailureClass::Network.is_transient());
        assert!(FailureClass::ServerError(503).is_transient());
        assert!(FailureClass::RateLimited.is_transient());
    }

    #[test]
    fn test_terminal_classes() {
        assert!(!FailureClass::ClientError(400).is_transient());
        assert!(!FailureClass::Cancelled.is_transient());
        assert!(!FailureClass::Parse.is_transient());
        assert!(!FailureClass::Offline.is_transient());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(FailureClass::from_status(429), FailureClass::RateLimited);
        assert_eq!(FailureClass::from_status(502), FailureClass::ServerError(502));
        assert_eq!(FailureClass::from_status(404), FailureClass::ClientError(404));
    }

    #[test]
    fn test_display_includes_status() {
        let err = CallError::new(FailureClass::ServerError(503), "upstream busy");
        assert_eq!(err.to_string(), "server_error (503): upstream busy");
    }
}
