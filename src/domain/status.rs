//! Normalized snapshot of a remote run
//!
//! Each vendor adapter translates its own payload into a RunStatus. The
//! poller only ever looks at this shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Vendor status code as reported, numeric (dbt) or textual (Fivetran)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Code(i64),
    Text(String),
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawStatus::Code(code) => write!(f, "{}", code),
            RawStatus::Text(text) => write!(f, "{}", text),
        }
    }
}

impl From<i64> for RawStatus {
    fn from(code: i64) -> Self {
        RawStatus::Code(code)
    }
}

impl From<&str> for RawStatus {
    fn from(text: &str) -> Self {
        RawStatus::Text(text.to_string())
    }
}

/// One poll's view of a remote run.
///
/// Replaced wholesale on every poll. A run that is not complete never
/// carries error or cancel flags; `RunStatus::running` enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub raw_code: RawStatus,
    pub is_complete: bool,
    pub is_error: bool,
    pub is_cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    #[serde(default)]
    pub failed_steps: Vec<String>,
}

impl RunStatus {
    pub fn running(raw_code: impl Into<RawStatus>) -> Self {
        Self {
            raw_code: raw_code.into(),
            is_complete: false,
            is_error: false,
            is_cancelled: false,
            status_message: None,
            failed_steps: Vec::new(),
        }
    }

    pub fn succeeded(raw_code: impl Into<RawStatus>) -> Self {
        Self {
            is_complete: true,
            ..Self::running(raw_code)
        }
    }

    pub fn errored(raw_code: impl Into<RawStatus>, failed_steps: Vec<String>) -> Self {
        Self {
            is_complete: true,
            is_error: true,
            failed_steps,
            ..Self::running(raw_code)
        }
    }

    pub fn cancelled(raw_code: impl Into<RawStatus>) -> Self {
        Self {
            is_complete: true,
            is_cancelled: true,
            ..Self::running(raw_code)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = Some(message.into());
        self
    }

    /// Flags are consistent: a running job carries no error/cancel flag and a
    /// finished one carries at most one.
    pub fn is_consistent(&self) -> bool {
        if !self.is_complete {
            !self.is_error && !self.is_cancelled
        } else {
            !(self.is_error && self.is_cancelled)
        }
    }
}

/// dbt Cloud run status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbtRunState {
    Queued,
    Starting,
    Running,
    Success,
    Error,
    Cancelled,
}

impl DbtRunState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Queued),
            2 => Some(Self::Starting),
            3 => Some(Self::Running),
            10 => Some(Self::Success),
            20 => Some(Self::Error),
            30 => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn code(&self) -> i64 {
        match self {
            Self::Queued => 1,
            Self::Starting => 2,
            Self::Running => 3,
            Self::Success => 10,
            Self::Error => 20,
            Self::Cancelled => 30,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Success => "Success",
            Self::Error => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}
