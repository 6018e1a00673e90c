//! Runner module - trigger a remote job and wait for it to finish.
//!
//! - CompletionPoller drives one trigger-and-wait per call
//! - StopSignal lets the caller end a wait early

mod poller;
mod stop;

pub use poller::{CompletionPoller, DEFAULT_POKE_INTERVAL, PollerConfig, RunReport};
pub use stop::{StopHandle, StopSignal, stop_channel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        let config = PollerConfig::default();
        assert_eq!(config.poke_interval, DEFAULT_POKE_INTERVAL);
        assert_eq!(config.max_run_attempts, 1);
        assert!(!StopSignal::never().is_stopped());
    }
}
