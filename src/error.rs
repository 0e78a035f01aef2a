//! Custom error types for rustsds.
//!
//! All library functions return `Result<T, SdsError>` instead of using `unwrap()`.
//! Only [`SdsError::InvalidStructure`] and [`SdsError::Render`] ever leave
//! [`crate::pipeline::SdsGenerator`]; every other variant is recovered locally
//! and reported through [`SourceError`] records on the document.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for rustsds operations.
#[derive(Debug, Error)]
pub enum SdsError {
    /// The identifier does not describe a valid molecule
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    /// An external source (database, registry, generative service) failed
    #[error("Source unavailable: {name}: {reason}")]
    SourceUnavailable {
        /// Source name
        name: String,
        /// Failure cause
        reason: String,
    },

    /// A candidate field value failed validation or cleaning
    #[error("Validation rejected for {field}: {reason}")]
    ValidationRejected {
        /// Field name
        field: String,
        /// Why the value was dropped
        reason: String,
    },

    /// An outbound call exceeded its deadline
    #[error("Timeout after {secs}s: {name}")]
    Timeout {
        /// Source name
        name: String,
        /// Configured deadline
        secs: u64,
    },

    /// Document serialization failed
    #[error("Render error: {0}")]
    Render(String),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// HTML/JSON/pattern parsing error
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
}

impl SdsError {
    /// Wrap any error as a failure of the named source.
    pub fn unavailable(name: &str, reason: impl std::fmt::Display) -> Self {
        SdsError::SourceUnavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias using `SdsError`
pub type Result<T> = std::result::Result<T, SdsError>;

/// Machine-readable record of a recovered source failure, attached to the
/// generated document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    pub source: String,
    pub message: String,
}

impl SourceError {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
        }
    }

    /// Build from a recovered error; `SourceUnavailable` keeps its inner reason.
    pub fn from_error(source: &str, err: &SdsError) -> Self {
        let message = match err {
            SdsError::SourceUnavailable { reason, .. } => reason.clone(),
            other => other.to_string(),
        };
        Self::new(source, message)
    }
}

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| SdsError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_keeps_reason() {
        let err = SdsError::unavailable("NIST", "connection refused");
        let record = SourceError::from_error("NIST", &err);
        assert_eq!(record.source, "NIST");
        assert_eq!(record.message, "connection refused");
    }

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u8> = None;
        assert!(matches!(missing.ok_or_parse("no cid"), Err(SdsError::Parse(_))));
    }
}
