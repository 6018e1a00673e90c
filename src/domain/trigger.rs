//! Trigger requests and the handles they produce
//!
//! A JobTrigger is built once per invocation and never changes. The RunHandle
//! it produces is owned by a single poll loop and dropped once the run reaches
//! a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request to start remote work on one job or connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTrigger {
    /// Job id (dbt) or connector id (Fivetran)
    pub target_id: String,

    /// Free-text audit label recorded by the remote system
    pub cause: String,

    /// Override an in-progress run, when the remote API supports it
    pub force: bool,

    /// The caller will poll this run; vendors that need a baseline to detect
    /// completion only capture one when set
    #[serde(default = "default_wait")]
    pub wait_for_completion: bool,
}

fn default_wait() -> bool {
    true
}

impl JobTrigger {
    pub fn new(target_id: impl Into<String>, cause: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            cause: cause.into(),
            force: false,
            wait_for_completion: true,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_wait(mut self, wait: bool) -> Self {
        self.wait_for_completion = wait;
        self
    }
}

/// Last known success/failure timestamps of a connector.
///
/// Vendors without a run id (Fivetran) detect completion by comparing the
/// current watermark against the one captured before triggering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub succeeded_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl SyncWatermark {
    pub fn new(succeeded_at: Option<DateTime<Utc>>, failed_at: Option<DateTime<Utc>>) -> Self {
        Self { succeeded_at, failed_at }
    }

    /// True when either timestamp moved since `baseline`.
    pub fn advanced_since(&self, baseline: &SyncWatermark) -> bool {
        self.succeeded_at != baseline.succeeded_at || self.failed_at != baseline.failed_at
    }

    /// True when a failure was recorded that the baseline did not have.
    pub fn has_new_failure(&self, baseline: &SyncWatermark) -> bool {
        match (&baseline.failed_at, &self.failed_at) {
            (Some(prev), Some(now)) => prev != now,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

/// Identifier of one triggered run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    /// Unique per invocation of the remote job
    pub run_id: String,

    /// When the trigger call succeeded
    pub started_at: DateTime<Utc>,

    /// Baseline captured at trigger time, for vendors that need one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<SyncWatermark>,
}

impl RunHandle {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            watermark: None,
        }
    }

    pub fn with_watermark(mut self, watermark: SyncWatermark) -> Self {
        self.watermark = Some(watermark);
        self
    }
}
