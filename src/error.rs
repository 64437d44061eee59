//! Custom error types for rustscholarly.
//!
//! Retrieval failures are terminal outcomes of the [`Navigator`](crate::navigator::Navigator)
//! retry loop. Everything the loop can recover from stays inside it; only the
//! variants below cross the component boundary.

use thiserror::Error;

/// Main error type for rustscholarly operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Network/HTTP request error outside the retry loop (probes, account checks)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Retry budget consumed on every bucket the target was tried on
    #[error("Cannot fetch from Google Scholar after {attempts} attempts: {url}")]
    RetrievalExhausted {
        /// Absolute URL that could not be fetched
        url: String,
        /// Counted attempts across all buckets
        attempts: u32,
    },

    /// Hard block: the response carried the DOS-prevention marker
    #[error("DOS attack was detected while fetching {url}")]
    AbuseDetected {
        /// Absolute URL that returned the marker
        url: String,
    },

    /// Soft block: an interactive challenge has to be solved out of band
    #[error("CAPTCHA detected while fetching {url}, manual intervention required")]
    CaptchaRequired {
        /// Absolute URL that returned the challenge
        url: String,
    },

    /// HTML parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ScholarError {
    /// True for the blocking outcomes an operator should react to
    /// (slow down, change network path) instead of retrying.
    pub fn is_block(&self) -> bool {
        matches!(
            self,
            ScholarError::AbuseDetected { .. } | ScholarError::CaptchaRequired { .. }
        )
    }
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
