//! Error types for the limiter.

use thiserror::Error;

/// Main error type for limiter operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// Invalid or missing configuration. Fatal to construction.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The namespace has no tokens left in its current window.
    #[error("No tokens available")]
    Exhausted,

    /// No tokio runtime was available to drive expiry timers.
    #[error("No tokio runtime available to schedule bucket expiry")]
    NoRuntime,
}

impl LimiterError {
    /// Whether this is the recoverable exhaustion case.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, LimiterError::Exhausted)
    }
}

/// Result type alias for limiter operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
