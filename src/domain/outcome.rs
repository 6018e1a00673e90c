//! Poll and run outcome types.
//!
//! `PollOutcome` is what a single poll means; `RunOutcome` is what the caller
//! of a whole trigger-and-wait gets back.

use std::fmt;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::domain::status::RunStatus;
use crate::error::{JobError, TransientKind};

/// Structured summary of a failed remote run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub run_id: String,
    pub status: String,
    pub status_message: Option<String>,
    pub failed_steps: Vec<String>,
}

impl FailureDetail {
    pub fn from_status(run_id: &str, status: &RunStatus) -> Self {
        Self {
            run_id: run_id.to_string(),
            status: status.raw_code.to_string(),
            status_message: status.status_message.clone(),
            failed_steps: status.failed_steps.clone(),
        }
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run {} ended with status {}", self.run_id, self.status)?;
        if let Some(message) = &self.status_message {
            write!(f, ": {}", message)?;
        }
        if !self.failed_steps.is_empty() {
            write!(f, " (failed steps: {})", self.failed_steps.join(", "))?;
        }
        Ok(())
    }
}

/// Meaning of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure(FailureDetail),
    Cancelled,
    StillRunning,
    TransientError {
        kind: TransientKind,
        reason: String,
        retry_after: Option<Duration>,
    },
}

impl PollOutcome {
    /// Map a status snapshot to an outcome.
    ///
    /// `is_complete == false` wins over every other flag. Among terminal
    /// flags `is_error` is checked first, so a status claiming both error and
    /// cancellation is treated as a failure.
    pub fn classify(run_id: &str, status: &RunStatus) -> Self {
        if !status.is_complete {
            if status.is_error || status.is_cancelled {
                warn!(
                    "Run {} reports error/cancel flags while still running (status {}), ignoring them",
                    run_id, status.raw_code
                );
            }
            return PollOutcome::StillRunning;
        }

        if status.is_error {
            if status.is_cancelled {
                warn!(
                    "Run {} reports both error and cancelled (status {}), treating as failure",
                    run_id, status.raw_code
                );
            }
            return PollOutcome::Failure(FailureDetail::from_status(run_id, status));
        }

        if status.is_cancelled {
            return PollOutcome::Cancelled;
        }

        PollOutcome::Success
    }

    /// Map a poll error onto an outcome. Only transient errors have one;
    /// permanent errors end the loop and are handled by the caller.
    pub fn from_error(err: &JobError) -> Option<Self> {
        let retry_after = match err {
            JobError::RateLimited { retry_after } => *retry_after,
            _ => None,
        };
        err.transient_kind().map(|kind| PollOutcome::TransientError {
            kind,
            reason: err.to_string(),
            retry_after,
        })
    }
}

/// Final result of a trigger-and-wait, the vocabulary callers branch on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Trigger succeeded and the caller asked not to wait
    Started { run_id: String },
    Success,
    Failure(FailureDetail),
    /// The remote system reported the run as cancelled
    Cancelled,
    /// The caller stopped waiting (stop request or deadline)
    CancelledByCaller { reason: String },
    AuthError { message: String },
    InvalidTarget { message: String },
    BadRequest { message: String },
    RetriesExhausted {
        kind: TransientKind,
        attempts: u32,
        last_error: String,
    },
    UnknownError { message: String },
}

impl RunOutcome {
    /// Outcome for a permanent client error. Transient errors that reach here
    /// unclassified end up as `UnknownError`.
    pub fn from_error(err: &JobError) -> Self {
        match err {
            JobError::Auth(_) | JobError::CredentialsUnavailable(_) => RunOutcome::AuthError {
                message: err.to_string(),
            },
            JobError::NotFound(_) => RunOutcome::InvalidTarget {
                message: err.to_string(),
            },
            JobError::BadRequest(_) | JobError::Config(_) => RunOutcome::BadRequest {
                message: err.to_string(),
            },
            _ => RunOutcome::UnknownError {
                message: err.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success | RunOutcome::Started { .. })
    }

    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Started { .. } | RunOutcome::Success => 0,
            RunOutcome::AuthError { .. } => 200,
            RunOutcome::BadRequest { .. } => 201,
            RunOutcome::Failure(_) => 202,
            RunOutcome::InvalidTarget { .. } => 204,
            RunOutcome::Cancelled => 210,
            RunOutcome::CancelledByCaller { .. } => 211,
            RunOutcome::RetriesExhausted { .. } => 220,
            RunOutcome::UnknownError { .. } => 249,
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Started { run_id } => write!(f, "started run {}", run_id),
            RunOutcome::Success => write!(f, "succeeded"),
            RunOutcome::Failure(detail) => write!(f, "failed: {}", detail),
            RunOutcome::Cancelled => write!(f, "cancelled remotely"),
            RunOutcome::CancelledByCaller { reason } => write!(f, "stopped waiting: {}", reason),
            RunOutcome::AuthError { message }
            | RunOutcome::InvalidTarget { message }
            | RunOutcome::BadRequest { message }
            | RunOutcome::UnknownError { message } => write!(f, "{}", message),
            RunOutcome::RetriesExhausted {
                kind,
                attempts,
                last_error,
            } => write!(f, "gave up after {} {} retries: {}", attempts, kind, last_error),
        }
    }
}
