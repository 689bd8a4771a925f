use std::time::Duration;

use rand::Rng;

/// Bounded retry policy for publishing a single post within one run.
///
/// Attempt `n` (1-based) that fails is followed by a sleep of
/// `base_delay * 2^(n-1)`, capped at `max_delay`, plus up to `jitter` of
/// extra random delay. No retry state survives the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the computed delay added as random jitter (0.0 – 1.0).
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.1,
        }
    }
}

impl RetryPolicy {
    /// Retries without sleeping. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay before the attempt following failed attempt `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);

        if self.jitter <= 0.0 || backoff.is_zero() {
            return backoff;
        }

        let factor = rand::thread_rng().gen_range(0.0..=self.jitter.min(1.0));
        backoff + backoff.mul_f64(factor)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
