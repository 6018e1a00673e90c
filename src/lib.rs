//! Jobwait - trigger remote data-pipeline jobs and wait for them to finish
//!
//! A JobClient per vendor (dbt Cloud, Fivetran) hides the vendor API; the
//! CompletionPoller triggers a job, polls it with backoff, and reports a
//! single RunOutcome.

pub mod backoff;
pub mod client;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod runner;
pub mod vendors;

pub use client::{JobClient, MockJobClient};
pub use domain::{RunOutcome, RunStatus};
pub use error::{JobError, Result};
pub use runner::{CompletionPoller, PollerConfig, RunReport, StopSignal};
