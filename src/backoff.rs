//! Backoff state for transient poll failures.
//!
//! Every consecutive transient failure doubles the delay, starting from the
//! policy's base. Each transient class has its own retry cap; rate limiting
//! is uncapped by default and only ends on success, stop or deadline. One
//! successful poll resets everything.

use std::collections::HashMap;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::TransientKind;

/// Default first delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default retry cap for timeouts, connection errors and malformed bodies.
pub const DEFAULT_TRANSIENT_RETRIES: u32 = 5;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Delay after the first transient failure.
    pub base: Duration,
    /// Upper bound on any single delay (None = unbounded).
    pub max_delay: Option<Duration>,
    /// Use the server's Retry-After when it is longer than the computed delay.
    pub honor_retry_after: bool,
    /// Retry caps per class (None = retry until success, stop or deadline).
    pub rate_limit_retries: Option<u32>,
    pub timeout_retries: Option<u32>,
    pub connection_retries: Option<u32>,
    pub malformed_retries: Option<u32>,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BASE_DELAY,
            max_delay: None,
            honor_retry_after: false,
            rate_limit_retries: None,
            timeout_retries: Some(DEFAULT_TRANSIENT_RETRIES),
            connection_retries: Some(DEFAULT_TRANSIENT_RETRIES),
            malformed_retries: Some(DEFAULT_TRANSIENT_RETRIES),
        }
    }
}

impl BackoffPolicy {
    /// Policy with a custom base delay and default caps.
    pub fn with_base(base: Duration) -> Self {
        Self {
            base,
            ..Default::default()
        }
    }

    /// Retry cap for a transient class.
    pub fn limit_for(&self, kind: TransientKind) -> Option<u32> {
        match kind {
            TransientKind::RateLimit => self.rate_limit_retries,
            TransientKind::Timeout => self.timeout_retries,
            TransientKind::Connection => self.connection_retries,
            TransientKind::Malformed => self.malformed_retries,
        }
    }

    /// Delay after the k-th consecutive failure: `base * 2^(k-1)`.
    pub fn delay_for(&self, consecutive: u32) -> Duration {
        let exponent = consecutive.saturating_sub(1);
        let factor = 2u32.saturating_pow(exponent);
        let delay = self.base.saturating_mul(factor);
        match self.max_delay {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Sleep for `delay`, then retry. `attempt` counts failures of this class.
    Retry { delay: Duration, attempt: u32 },
    /// The class cap was exceeded.
    Exhausted { attempts: u32 },
}

/// Per-loop backoff state. Not shared between poll loops.
#[derive(Debug, Default)]
pub struct BackoffState {
    /// Number of consecutive transient failures, any class.
    pub consecutive_failures: u32,
    per_kind: HashMap<TransientKind, u32>,
}

impl BackoffState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Failures of one class since the last success.
    pub fn failures(&self, kind: TransientKind) -> u32 {
        self.per_kind.get(&kind).copied().unwrap_or(0)
    }

    /// Record a transient failure and decide whether to retry.
    pub fn record_failure(
        &mut self,
        kind: TransientKind,
        policy: &BackoffPolicy,
        retry_after: Option<Duration>,
    ) -> BackoffDecision {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let count = self.per_kind.entry(kind).or_insert(0);
        *count = count.saturating_add(1);
        let attempt = *count;

        if let Some(limit) = policy.limit_for(kind) {
            if attempt > limit {
                return BackoffDecision::Exhausted { attempts: attempt };
            }
        }

        let mut delay = policy.delay_for(self.consecutive_failures);
        if policy.honor_retry_after {
            if let Some(server_delay) = retry_after {
                delay = delay.max(server_delay);
            }
        }

        warn!(
            "Transient {} (attempt {}, {} consecutive), backing off {:?}",
            kind, attempt, self.consecutive_failures, delay
        );

        BackoffDecision::Retry { delay, attempt }
    }

    /// Record a successful poll. Resets every counter.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.per_kind.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retry_delay(decision: BackoffDecision) -> Duration {
        match decision {
            BackoffDecision::Retry { delay, .. } => delay,
            other => panic!("Expected retry, got {:?}", other),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.limit_for(TransientKind::RateLimit), None);
        assert_eq!(policy.limit_for(TransientKind::Timeout), Some(5));
        assert_eq!(policy.limit_for(TransientKind::Connection), Some(5));
        assert_eq!(policy.limit_for(TransientKind::Malformed), Some(5));
    }

    #[test]
    fn test_delay_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(32));
    }

    #[test]
    fn test_delay_is_monotonic_and_saturates() {
        let policy = BackoffPolicy::default();
        let mut previous = Duration::ZERO;
        for k in 1..200 {
            let delay = policy.delay_for(k);
            assert!(delay >= previous, "delay for {} went backwards", k);
            previous = delay;
        }
    }

    #[test]
    fn test_max_delay_clamps() {
        let policy = BackoffPolicy {
            max_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(5), Duration::from_secs(10));
        assert_eq!(policy.delay_for(30), Duration::from_secs(10));
    }

    #[test]
    fn test_rate_limit_is_uncapped_by_default() {
        let policy = BackoffPolicy::with_base(Duration::from_millis(1));
        let mut state = BackoffState::new();
        for _ in 0..50 {
            let decision = state.record_failure(TransientKind::RateLimit, &policy, None);
            assert!(matches!(decision, BackoffDecision::Retry { .. }));
        }
        assert_eq!(state.failures(TransientKind::RateLimit), 50);
    }

    #[test]
    fn test_timeout_exhausts_after_cap() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::new();
        for attempt in 1..=5 {
            let decision = state.record_failure(TransientKind::Timeout, &policy, None);
            assert_eq!(
                decision,
                BackoffDecision::Retry {
                    delay: policy.delay_for(attempt),
                    attempt
                }
            );
        }
        assert_eq!(
            state.record_failure(TransientKind::Timeout, &policy, None),
            BackoffDecision::Exhausted { attempts: 6 }
        );
    }

    #[test]
    fn test_caps_are_per_class() {
        let policy = BackoffPolicy {
            timeout_retries: Some(1),
            connection_retries: Some(1),
            ..Default::default()
        };
        let mut state = BackoffState::new();
        assert!(matches!(
            state.record_failure(TransientKind::Timeout, &policy, None),
            BackoffDecision::Retry { .. }
        ));
        assert!(matches!(
            state.record_failure(TransientKind::Connection, &policy, None),
            BackoffDecision::Retry { .. }
        ));
        assert!(matches!(
            state.record_failure(TransientKind::Timeout, &policy, None),
            BackoffDecision::Exhausted { attempts: 2 }
        ));
    }

    #[test]
    fn test_success_resets_delay_to_base() {
        let policy = BackoffPolicy::default();
        let mut state = BackoffState::new();
        retry_delay(state.record_failure(TransientKind::RateLimit, &policy, None));
        retry_delay(state.record_failure(TransientKind::RateLimit, &policy, None));
        let third = retry_delay(state.record_failure(TransientKind::RateLimit, &policy, None));
        assert_eq!(third, Duration::from_secs(4));

        state.record_success();
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.failures(TransientKind::RateLimit), 0);

        let after_reset = retry_delay(state.record_failure(TransientKind::Timeout, &policy, None));
        assert_eq!(after_reset, Duration::from_secs(1));
    }

    #[test]
    fn test_retry_after_only_when_enabled() {
        let mut policy = BackoffPolicy::default();
        let mut state = BackoffState::new();
        let delay = retry_delay(state.record_failure(
            TransientKind::RateLimit,
            &policy,
            Some(Duration::from_secs(30)),
        ));
        assert_eq!(delay, Duration::from_secs(1));

        policy.honor_retry_after = true;
        let mut state = BackoffState::new();
        let delay = retry_delay(state.record_failure(
            TransientKind::RateLimit,
            &policy,
            Some(Duration::from_secs(30)),
        ));
        assert_eq!(delay, Duration::from_secs(30));
    }
}
