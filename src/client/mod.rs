//! Job client layer
//!
//! This module provides:
//! - JobClient trait, one implementation per external job API
//! - Shared HTTP status classification
//! - MockJobClient for tests and dry runs

pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::domain::{JobTrigger, RunHandle, RunStatus};
use crate::error::Result;

pub use mock::MockJobClient;

/// Stateless client for one job-trigger API.
///
/// Each call is a single outbound request; nothing is remembered between
/// calls except what the caller threads through the RunHandle.
#[async_trait]
pub trait JobClient: Send + Sync {
    /// Start a run of `trigger.target_id`.
    async fn trigger(&self, trigger: &JobTrigger) -> Result<RunHandle>;

    /// Fetch the current state of a run started by `trigger`.
    async fn poll_status(&self, handle: &RunHandle) -> Result<RunStatus>;

    /// Cheap authenticated read to confirm credentials and reachability.
    async fn check_connection(&self) -> Result<()>;

    /// Vendor name for logs.
    fn name(&self) -> &str;
}
