//! Error kinds surfaced by the TRI client.
//!
//! Every failure is one of three distinct kinds so callers can branch on
//! retryability: [`TransientError`] (worth retrying later),
//! [`PermanentError`] (will fail again as-is) and [`StateError`] (the
//! accessor was used out of order).

use std::time::Duration;

/// Failures that may succeed if the same request is issued again.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransientError {
    /// The request did not complete within the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),
    /// The connection could not be established or was reset.
    #[error("Connection failed: {0}")]
    Connect(String),
    /// Any other failure while sending the request or reading the body.
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP 5xx from the Envirofacts service.
    #[error("Server error: HTTP {0}")]
    Server(u16),
    /// HTTP 429.
    #[error("Rate limit exceeded{}", retry_after_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },
}

fn retry_after_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

/// Failures that will not be resolved by retrying the same request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PermanentError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Request error: HTTP {status}: {body}")]
    ClientError { status: u16, body: String },
    #[error("Invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("Unknown column {column:?} for table {table}")]
    UnknownColumn { table: String, column: String },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// A 2xx response whose body could not be turned into rows.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("No result available: call filter() before reading columns")]
    NoResult,
}

/// Top-level error returned by every fallible operation in this crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriError {
    #[error(transparent)]
    Transient(#[from] TransientError),
    #[error(transparent)]
    Permanent(#[from] PermanentError),
    #[error(transparent)]
    State(#[from] StateError),
}

impl TriError {
    /// Whether issuing the same request again could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TriError::Transient(_))
    }
}

pub type Result<T, E = TriError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryability() {
        assert!(TriError::from(TransientError::Server(503)).is_retryable());
        assert!(
            TriError::from(TransientError::RateLimited { retry_after: None }).is_retryable()
        );
        assert!(!TriError::from(PermanentError::NotFound("x".into())).is_retryable());
        assert!(!TriError::from(StateError::NoResult).is_retryable());
    }

    #[test]
    fn test_display() {
        let err = TriError::from(TransientError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        });
        assert_eq!(err.to_string(), "Rate limit exceeded (retry after 7s)");

        let err = TriError::from(PermanentError::ClientError {
            status: 400,
            body: "bad column".into(),
        });
        assert!(err.to_string().contains("HTTP 400"));
        assert!(err.to_string().contains("bad column"));

        let err = TriError::from(StateError::NoResult);
        assert!(err.to_string().contains("filter()"));
    }
}
