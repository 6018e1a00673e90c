//! Domain types for jobwait
//!
//! - JobTrigger / RunHandle: what starts a run and how it is identified
//! - RunStatus: vendor-neutral snapshot of a run
//! - PollOutcome / RunOutcome: what a poll, and a whole wait, resolved to

pub mod outcome;
pub mod status;
pub mod trigger;

pub use outcome::{FailureDetail, PollOutcome, RunOutcome};
pub use status::{DbtRunState, RawStatus, RunStatus};
pub use trigger::{JobTrigger, RunHandle, SyncWatermark};
