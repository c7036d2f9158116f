use std::time::Duration;

use crate::TransportFailureKind;

/// Failure outcome of a call that reached a terminal, non-cancelled state.
///
/// The set is closed: callers match on the kind instead of inspecting raw
/// status codes.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Credentials were rejected (401 or 403).
    #[error("authentication failed: {message}")]
    Authentication { status_code: u16, message: String },
    /// Target resource does not exist (404).
    #[error("not found: {message}")]
    NotFound { message: String },
    /// Server throttled the call (429) and retries were exhausted.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Server-supplied `Retry-After`, never a computed backoff.
        retry_after: Option<Duration>,
        message: String,
    },
    /// Any other error status.
    #[error("api error {status_code}: {message}")]
    Api { status_code: u16, message: String },
    /// No response could be obtained from the server.
    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportFailureKind,
        message: String,
    },
}

impl DomainError {
    /// HTTP status behind this error, when the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::NotFound { .. } => Some(404),
            Self::Authentication { status_code, .. } | Self::Api { status_code, .. } => {
                Some(*status_code)
            }
            Self::RateLimited { .. } => Some(429),
        }
    }

    /// Last server-supplied wait for a rate-limited call.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Human-readable description of the failure.
    pub fn message(&self) -> &str {
        match self {
            Self::Authentication { message, .. }
            | Self::NotFound { message }
            | Self::RateLimited { message, .. }
            | Self::Api { message, .. }
            | Self::Transport { message, .. } => message,
        }
    }
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ScanApiError {
    /// Classified API or transport failure.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// The caller cancelled the call. Never retried and never classified.
    #[error("call cancelled")]
    Cancelled,
    /// Success payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Request could not be built (invalid header name or value, bad path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Invalid client configuration or HTTP client construction failure.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScanApiError {
    /// True when the caller's cancellation ended the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classified failure, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(err) => Some(err),
            _ => None,
        }
    }
}
