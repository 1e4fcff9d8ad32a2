//! Retry policy for model service calls.
//!
//! Transient failures back off exponentially with random jitter; anything
//! else waits a short fixed delay. Both kinds share one attempt budget.

use rand::Rng;
use relay_provider::ProviderError;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1_000);
const DEFAULT_FIXED_DELAY: Duration = Duration::from_millis(1_000);

/// How a failed call should be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limiting, overload, timeouts, 5xx.
    Transient,
    Permanent,
}

impl FailureClass {
    pub fn of(error: &ProviderError) -> Self {
        if error.is_transient() {
            FailureClass::Transient
        } else {
            FailureClass::Permanent
        }
    }
}

/// Retry configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_attempts: u32,
    /// Backoff unit for transient failures.
    pub base_delay: Duration,
    /// Upper bound of the random jitter added to transient backoff.
    pub max_jitter: Duration,
    /// Wait after a non-transient failure.
    pub fixed_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_jitter: DEFAULT_MAX_JITTER,
            fixed_delay: DEFAULT_FIXED_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Same attempt budget with no waiting.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
            fixed_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Builder: set max attempts (at least one).
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Builder: set the transient backoff unit.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Delay after failed attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32, class: FailureClass) -> Duration {
        match class {
            FailureClass::Transient => {
                let exponent = attempt.saturating_sub(1).min(16);
                let backoff = self.base_delay.saturating_mul(1u32 << exponent);
                backoff.saturating_add(self.jitter())
            }
            FailureClass::Permanent => self.fixed_delay,
        }
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}
