//! Retry policy with exponential backoff for provider calls
//!
//! Backoff doubles from the initial delay up to the cap:
//! 500ms → 1s → 2s → 4s → 8s (max). Only transient provider errors are
//! retried on the same route; permanent errors move the dispatcher to the
//! next route straight away.

use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

use crate::domain::models::RetryConfig;
use crate::domain::ports::ProviderError;

/// Retry policy for one `(model, credential)` route.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_backoff: Duration,

    /// Maximum backoff duration
    pub max_backoff: Duration,

    /// Jitter applied to each delay, 0.0 for a fixed schedule
    pub randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms.max(initial_backoff_ms)),
            randomization_factor: 0.0,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }

    #[must_use]
    pub const fn with_randomization(mut self, factor: f64) -> Self {
        self.randomization_factor = factor;
        self
    }

    /// Attempts per route, including the first.
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Fresh backoff schedule for one route.
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_max_interval(self.max_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(self.randomization_factor)
            .with_max_elapsed_time(None)
            .build()
    }

    /// Whether `error`, seen on attempt `attempt` (0-based), earns another
    /// attempt on the same route.
    pub const fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }

    /// Next delay from `schedule`, falling back to the cap.
    pub fn next_delay(&self, schedule: &mut ExponentialBackoff) -> Duration {
        schedule.next_backoff().unwrap_or(self.max_backoff)
    }
}
