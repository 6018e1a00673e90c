//! Scripted JobClient for tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::client::JobClient;
use crate::domain::{JobTrigger, RunHandle, RunStatus};
use crate::error::{JobError, Result};

/// Replays scripted trigger and poll results in order and counts calls.
///
/// When the trigger script runs out a fresh handle is returned; when the
/// poll script runs out a permanent error ends the loop.
#[derive(Debug, Default)]
pub struct MockJobClient {
    trigger_script: Mutex<VecDeque<Result<RunHandle>>>,
    poll_script: Mutex<VecDeque<Result<RunStatus>>>,
    triggers_seen: Mutex<Vec<JobTrigger>>,
    trigger_calls: AtomicUsize,
    poll_calls: AtomicUsize,
}

impl MockJobClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(self, result: Result<RunHandle>) -> Self {
        self.trigger_script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_poll(self, result: Result<RunStatus>) -> Self {
        self.poll_script.lock().unwrap().push_back(result);
        self
    }

    pub fn with_polls(self, results: impl IntoIterator<Item = Result<RunStatus>>) -> Self {
        self.poll_script.lock().unwrap().extend(results);
        self
    }

    pub fn trigger_calls(&self) -> usize {
        self.trigger_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    /// Every trigger request received, in order.
    pub fn triggers_seen(&self) -> Vec<JobTrigger> {
        self.triggers_seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobClient for MockJobClient {
    async fn trigger(&self, trigger: &JobTrigger) -> Result<RunHandle> {
        let n = self.trigger_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.triggers_seen.lock().unwrap().push(trigger.clone());
        self.trigger_script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RunHandle::new(format!("mock-run-{}", n))))
    }

    async fn poll_status(&self, _handle: &RunHandle) -> Result<RunStatus> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.poll_script.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(JobError::UnknownApi {
                status: 500,
                body: "mock poll script exhausted".to_string(),
            })
        })
    }

    async fn check_connection(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
