//! Error types for jobwait
//!
//! Centralized error handling using thiserror. Every failure a `JobClient`
//! can produce lands in one of these variants so the poller can decide
//! between retrying and aborting by pattern matching.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// All error types that can occur while talking to a job API
#[derive(Debug, Error)]
pub enum JobError {
    /// 401/403, or credentials rejected by the API
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Job or connector id does not exist
    #[error("Invalid target: {0}")]
    NotFound(String),

    /// 400-class validation failure
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// HTTP 429
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Request timed out (client side, 408 or 504)
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Could not reach the API
    #[error("Connection error: {0}")]
    Connection(String),

    /// 2xx response whose body is not the JSON shape we expect
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Any other non-2xx response
    #[error("Unknown API error {status}: {body}")]
    UnknownApi { status: u16, body: String },

    /// Credential lookup failed
    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    /// Invalid local configuration or input
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Transient error classes, each with its own retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransientKind {
    RateLimit,
    Timeout,
    Connection,
    Malformed,
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransientKind::RateLimit => "rate limit",
            TransientKind::Timeout => "timeout",
            TransientKind::Connection => "connection error",
            TransientKind::Malformed => "malformed response",
        };
        write!(f, "{}", s)
    }
}

impl JobError {
    /// Which transient class this error belongs to, if any.
    pub fn transient_kind(&self) -> Option<TransientKind> {
        match self {
            JobError::RateLimited { .. } => Some(TransientKind::RateLimit),
            JobError::Timeout(_) => Some(TransientKind::Timeout),
            JobError::Connection(_) => Some(TransientKind::Connection),
            JobError::MalformedResponse(_) => Some(TransientKind::Malformed),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            JobError::Timeout(err.to_string())
        } else if err.is_connect() || err.is_request() {
            JobError::Connection(err.to_string())
        } else if err.is_decode() {
            JobError::MalformedResponse(err.to_string())
        } else if err.is_builder() {
            JobError::Config(err.to_string())
        } else {
            JobError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for JobError {
    fn from(err: serde_json::Error) -> Self {
        JobError::MalformedResponse(err.to_string())
    }
}

/// Result type alias for jobwait operations
pub type Result<T> = std::result::Result<T, JobError>;
