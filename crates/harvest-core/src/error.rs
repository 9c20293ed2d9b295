//! Error types for harvest operations.
//!
//! This module defines [`HarvestError`] which covers every failure that can
//! occur while fetching pages, validating their shape, or persisting them to a
//! sink.

use thiserror::Error;

/// Errors that can occur while fetching or persisting data.
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Network-related errors (connection failures, DNS, TLS, etc.).
    #[error("Network error: {0}")]
    Network(String),

    /// The remote call did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The remote API answered with a non-success status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body or reason phrase.
        message: String,
    },

    /// Rate limit exceeded by the remote API.
    #[error("Rate limited: retry after {retry_after:?}")]
    RateLimited {
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The credentials were rejected.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested company identifier is unknown.
    #[error("Identifier not found: {0}")]
    IdentifierNotFound(String),

    /// Error parsing data returned by the remote API.
    #[error("Parse error: {0}")]
    Parse(String),

    /// A page does not match the shape already established for the sink.
    #[error("Schema mismatch: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        /// Columns established by the sink.
        expected: Vec<String>,
        /// Columns of the offending page or file.
        found: Vec<String>,
    },

    /// A sink opened in create mode already holds data.
    #[error("Sink already exists: {0}")]
    SinkExists(String),

    /// Error writing to or reading from a sink.
    #[error("Sink error: {0}")]
    Sink(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested feature is not supported.
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl HarvestError {
    /// Returns the HTTP status carried by this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            Self::IdentifierNotFound(_) => Some(404),
            _ => None,
        }
    }

    /// Builds a [`HarvestError::SchemaMismatch`] from two column lists.
    pub fn schema_mismatch<E, F>(expected: E, found: F) -> Self
    where
        E: IntoIterator,
        E::Item: ToString,
        F: IntoIterator,
        F::Item: ToString,
    {
        Self::SchemaMismatch {
            expected: expected.into_iter().map(|c| c.to_string()).collect(),
            found: found.into_iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Result type alias using [`HarvestError`].
pub type Result<T> = std::result::Result<T, HarvestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status() {
        let err = HarvestError::Http {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(
            HarvestError::IdentifierNotFound("ZZZZ".to_string()).status(),
            Some(404)
        );
        assert_eq!(HarvestError::Other("x".to_string()).status(), None);
    }

    #[test]
    fn test_schema_mismatch_display() {
        let err = HarvestError::schema_mismatch(["ticker", "value"], ["ticker"]);
        let msg = err.to_string();
        assert!(msg.contains("value"));
        assert!(msg.starts_with("Schema mismatch"));
    }
}
