//! Completion poller - triggers a remote job and waits for a terminal state.
//!
//! One poll loop per call to `run`:
//! 1. Trigger the job (any error ends the loop immediately)
//! 2. Sleep the poke interval, then poll
//! 3. Still running: go to 2
//! 4. Transient error: sleep the backoff delay instead, then poll again
//! 5. Terminal state or permanent error: done
//!
//! Stop requests and the deadline are checked at every sleep and network call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use crate::backoff::{BackoffDecision, BackoffPolicy, BackoffState};
use crate::client::JobClient;
use crate::domain::{JobTrigger, PollOutcome, RunHandle, RunOutcome};
use crate::runner::StopSignal;

/// Default wait between polls.
pub const DEFAULT_POKE_INTERVAL: Duration = Duration::from_secs(30);

/// Configuration for the CompletionPoller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait before each regular poll
    pub poke_interval: Duration,
    /// Backoff for transient poll failures
    pub backoff: BackoffPolicy,
    /// Give up waiting after this long, measured from the start of `run`
    pub deadline: Option<Duration>,
    /// Re-trigger after a remote failure or cancellation, up to this many runs
    pub max_run_attempts: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poke_interval: DEFAULT_POKE_INTERVAL,
            backoff: BackoffPolicy::default(),
            deadline: None,
            max_run_attempts: 1,
        }
    }
}

/// What one `run` did and how it ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Id of the last run triggered, if any trigger succeeded
    pub run_id: Option<String>,
    pub attempts: u32,
    pub trigger_calls: u32,
    pub poll_calls: u32,
}

#[derive(Debug, Default)]
struct Tally {
    run_id: Option<String>,
    attempts: u32,
    trigger_calls: u32,
    poll_calls: u32,
}

impl Tally {
    fn finish(self, outcome: RunOutcome) -> RunReport {
        RunReport {
            outcome,
            run_id: self.run_id,
            attempts: self.attempts,
            trigger_calls: self.trigger_calls,
            poll_calls: self.poll_calls,
        }
    }
}

/// Races work against the caller's stop signal and deadline.
struct Guard {
    stop: StopSignal,
    deadline_at: Option<Instant>,
}

impl Guard {
    fn new(stop: StopSignal, deadline: Option<Duration>) -> Self {
        Self {
            stop,
            // A deadline past the clock's range never fires
            deadline_at: deadline.and_then(|d| Instant::now().checked_add(d)),
        }
    }

    async fn interrupted(&mut self) -> String {
        let deadline_at = self.deadline_at;
        let deadline = async move {
            match deadline_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.stop.stopped() => "stop requested".to_string(),
            _ = deadline => "deadline reached".to_string(),
        }
    }

    /// Run `work` unless the caller gives up first; Err carries the reason.
    async fn run<F: Future>(&mut self, work: F) -> Result<F::Output, String> {
        tokio::select! {
            biased;
            reason = self.interrupted() => Err(reason),
            output = work => Ok(output),
        }
    }
}

/// Drives trigger-then-wait on top of one JobClient.
pub struct CompletionPoller<C: JobClient + ?Sized> {
    client: Arc<C>,
    config: PollerConfig,
}

impl<C: JobClient + ?Sized> CompletionPoller<C> {
    /// Create a poller with default configuration.
    pub fn new(client: Arc<C>) -> Self {
        Self::with_config(client, PollerConfig::default())
    }

    /// Create a poller with custom configuration.
    pub fn with_config(client: Arc<C>, config: PollerConfig) -> Self {
        Self { client, config }
    }

    /// Trigger a job and, if `wait`, block until it finishes.
    ///
    /// With `wait == false` this returns `Started` as soon as the trigger
    /// succeeds.
    pub async fn run_job_and_wait(
        &self,
        target_id: &str,
        cause: &str,
        wait: bool,
        poke_interval_seconds: u64,
        stop: StopSignal,
    ) -> RunReport {
        if poke_interval_seconds == 0 {
            return Tally::default().finish(RunOutcome::BadRequest {
                message: "poke interval must be at least one second".to_string(),
            });
        }

        let trigger = JobTrigger::new(target_id, cause);
        let poller = CompletionPoller::with_config(
            Arc::clone(&self.client),
            PollerConfig {
                poke_interval: Duration::from_secs(poke_interval_seconds),
                ..self.config.clone()
            },
        );

        if wait {
            poller.run(&trigger, stop).await
        } else {
            poller.start(&trigger, stop).await
        }
    }

    /// Trigger only.
    pub async fn start(&self, trigger: &JobTrigger, stop: StopSignal) -> RunReport {
        let trigger = &trigger.clone().with_wait(false);
        let mut guard = Guard::new(stop, self.config.deadline);
        let mut tally = Tally {
            attempts: 1,
            ..Default::default()
        };

        match self.trigger_once(trigger, &mut guard, &mut tally).await {
            Ok(handle) => tally.finish(RunOutcome::Started { run_id: handle.run_id }),
            Err(outcome) => tally.finish(outcome),
        }
    }

    /// Trigger and wait for a terminal state.
    pub async fn run(&self, trigger: &JobTrigger, stop: StopSignal) -> RunReport {
        let mut guard = Guard::new(stop, self.config.deadline);
        let mut tally = Tally::default();
        let max_attempts = self.config.max_run_attempts.max(1);

        loop {
            tally.attempts += 1;

            let handle = match self.trigger_once(trigger, &mut guard, &mut tally).await {
                Ok(handle) => handle,
                Err(outcome) => return tally.finish(outcome),
            };

            let outcome = self.wait_for(&handle, &mut guard, &mut tally).await;

            let retriable = matches!(outcome, RunOutcome::Failure(_) | RunOutcome::Cancelled);
            if retriable && tally.attempts < max_attempts {
                warn!(
                    "{} run {} {}. Retrying... (Attempt {} of {})",
                    self.client.name(),
                    handle.run_id,
                    outcome,
                    tally.attempts + 1,
                    max_attempts
                );
                continue;
            }

            if retriable && max_attempts > 1 {
                error!(
                    "{} job {} after {} attempts",
                    self.client.name(),
                    outcome,
                    tally.attempts
                );
            }
            return tally.finish(outcome);
        }
    }

    async fn trigger_once(
        &self,
        trigger: &JobTrigger,
        guard: &mut Guard,
        tally: &mut Tally,
    ) -> Result<RunHandle, RunOutcome> {
        tally.trigger_calls += 1;

        let result = guard
            .run(self.client.trigger(trigger))
            .await
            .map_err(|reason| RunOutcome::CancelledByCaller { reason })?;

        match result {
            Ok(handle) => {
                tally.run_id = Some(handle.run_id.clone());
                Ok(handle)
            }
            Err(err) => {
                error!(
                    "Error triggering {} job {}: {}",
                    self.client.name(),
                    trigger.target_id,
                    err
                );
                Err(RunOutcome::from_error(&err))
            }
        }
    }

    async fn wait_for(&self, handle: &RunHandle, guard: &mut Guard, tally: &mut Tally) -> RunOutcome {
        let mut backoff = BackoffState::new();
        let mut delay = self.config.poke_interval;

        loop {
            if let Err(reason) = guard.run(tokio::time::sleep(delay)).await {
                info!("Stopped waiting for run {}: {}", handle.run_id, reason);
                return RunOutcome::CancelledByCaller { reason };
            }

            tally.poll_calls += 1;
            let result = match guard.run(self.client.poll_status(handle)).await {
                Ok(result) => result,
                Err(reason) => {
                    info!("Stopped waiting for run {}: {}", handle.run_id, reason);
                    return RunOutcome::CancelledByCaller { reason };
                }
            };

            let outcome = match &result {
                Ok(status) => PollOutcome::classify(&handle.run_id, status),
                Err(err) => match PollOutcome::from_error(err) {
                    Some(outcome) => outcome,
                    None => {
                        error!("Polling run {} failed: {}", handle.run_id, err);
                        return RunOutcome::from_error(err);
                    }
                },
            };

            match outcome {
                PollOutcome::StillRunning => {
                    backoff.record_success();
                    delay = self.config.poke_interval;
                    info!(
                        "The run {} is not yet completed. Waiting for {} seconds...",
                        handle.run_id,
                        delay.as_secs()
                    );
                }
                PollOutcome::Success => {
                    info!("{} run {} completed successfully", self.client.name(), handle.run_id);
                    return RunOutcome::Success;
                }
                PollOutcome::Failure(detail) => {
                    error!("{} run failure: {}", self.client.name(), detail);
                    return RunOutcome::Failure(detail);
                }
                PollOutcome::Cancelled => {
                    warn!("{} run {} was cancelled", self.client.name(), handle.run_id);
                    return RunOutcome::Cancelled;
                }
                PollOutcome::TransientError {
                    kind,
                    reason,
                    retry_after,
                } => match backoff.record_failure(kind, &self.config.backoff, retry_after) {
                    BackoffDecision::Retry { delay: next, .. } => delay = next,
                    BackoffDecision::Exhausted { attempts } => {
                        error!(
                            "Polling run {} failed after {} {} retries: {}",
                            handle.run_id, attempts, kind, reason
                        );
                        return RunOutcome::RetriesExhausted {
                            kind,
                            attempts,
                            last_error: reason,
                        };
                    }
                },
            }
        }
    }
}
