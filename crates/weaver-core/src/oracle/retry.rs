//! Retry policy for oracle calls
//!
//! A pure function from "attempt N just failed" to either a wait or giving up.
//! No clock, no randomness: the same inputs always produce the same step.

use std::time::Duration;

use crate::config::{BackoffKind, OracleConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Wait(Duration),
    GiveUp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: BackoffKind,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OracleConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffKind, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &OracleConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.backoff,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, BackoffKind::Fixed, Duration::ZERO, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// What to do after attempt number `attempt` (1-based) failed
    ///
    /// A server-suggested wait raises the delay but never beyond `max_delay`.
    pub fn next_step(&self, attempt: u32, suggested_wait: Option<Duration>) -> RetryStep {
        if attempt >= self.max_attempts {
            return RetryStep::GiveUp;
        }

        let computed = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.base_delay.saturating_mul(factor)
            }
        };

        let wait = match suggested_wait {
            Some(suggested) => computed.max(suggested),
            None => computed,
        };

        RetryStep::Wait(wait.min(self.max_delay))
    }
}
