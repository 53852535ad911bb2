//! Retry policy with exponential backoff and jitter

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Decides whether and when a failed fetch is retried
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_secs_f64(config.base_delay),
            max_delay: Duration::from_secs_f64(config.max_delay),
        }
    }

    /// Whether another attempt is allowed after `retries_done` retries
    pub fn should_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Backoff before retry number `retries_done + 1`
    ///
    /// `min(base * 2^retries_done, max)`, scaled by a random factor in
    /// `[0.5, 1.5)` and capped at `max`.
    ///
    /// # Arguments
    ///
    /// * `retries_done` - Retries already spent on the entry
    ///
    /// # Returns
    ///
    /// The delay before the entry may be fetched again
    pub fn delay_for(&self, retries_done: u32) -> Duration {
        let factor = rand::rng().random_range(0.5..1.5);
        self.delay_with_factor(retries_done, factor)
    }

    fn delay_with_factor(&self, retries_done: u32, factor: f64) -> Duration {
        let exponential = self
            .base_delay
            .checked_mul(2u32.saturating_pow(retries_done.min(31)))
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        exponential.mul_f64(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
