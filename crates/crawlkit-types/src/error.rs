//! Error taxonomy shared by every component of the crawl engine.
//!
//! Mirrors the classification table in the retry/circuit-breaker design:
//! the worker boundary converts any stage failure into one of these
//! variants before handing it to the retry component or the event bus.

use thiserror::Error;

/// A transport/application-level network error kind, used by the retry
/// component to look up the right policy row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RateLimited,
    ServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
    Unauthorized,
    Forbidden,
    Timeout,
    ConnectionFailure,
    DnsFailure,
    Security,
    Io,
    Other,
}

impl ErrorKind {
    /// Classify an HTTP status code into an [`ErrorKind`].
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => ErrorKind::RateLimited,
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            408 => ErrorKind::Timeout,
            502 => ErrorKind::BadGateway,
            503 => ErrorKind::ServiceUnavailable,
            504 => ErrorKind::GatewayTimeout,
            500..=599 => ErrorKind::ServerError,
            _ => ErrorKind::Other,
        }
    }

    /// Whether this kind is ever eligible for retry (independent of counters).
    pub fn is_retryable_kind(&self) -> bool {
        !matches!(
            self,
            ErrorKind::Unauthorized | ErrorKind::Forbidden | ErrorKind::DnsFailure | ErrorKind::Security
        )
    }
}

/// Top-level error surfaced by the pipeline and the engine.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("transient network error ({kind:?}, status={status:?}): {message}")]
    Transient {
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("permanent network error ({kind:?}, status={status:?}): {message}")]
    Permanent {
        kind: ErrorKind,
        status: Option<u16>,
        message: String,
    },

    #[error("policy rejection: {reason}")]
    PolicyRejected { reason: String },

    #[error("parse failure: {0}")]
    ParseFailed(String),

    #[error("storage failure: {0}")]
    StorageFailed(String),

    #[error("initialization failure: {0}")]
    Init(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl CrawlError {
    /// The [`ErrorKind`] driving retry decisions, if this error carries one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            CrawlError::Transient { kind, .. } | CrawlError::Permanent { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification_matches_retry_table() {
        assert_eq!(ErrorKind::from_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::Unauthorized);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_status(502), ErrorKind::BadGateway);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::ServiceUnavailable);
        assert_eq!(ErrorKind::from_status(504), ErrorKind::GatewayTimeout);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_status(200), ErrorKind::Other);
    }

    #[test]
    fn unauthorized_and_dns_never_retryable() {
        assert!(!ErrorKind::Unauthorized.is_retryable_kind());
        assert!(!ErrorKind::Forbidden.is_retryable_kind());
        assert!(!ErrorKind::DnsFailure.is_retryable_kind());
        assert!(!ErrorKind::Security.is_retryable_kind());
        assert!(ErrorKind::Timeout.is_retryable_kind());
    }
}
