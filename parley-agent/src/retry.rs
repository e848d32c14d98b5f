//! Retry policy

use parley_runtime::{Error, Result};
use std::time::Duration;

/// Default number of exchange attempts per dispatch.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default backoff unit; the n-th retry waits n units.
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_secs(2);

/// Bounded attempts with linear backoff.
///
/// `max_retries` counts every attempt, the first one included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff_unit: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Result<Self> {
        if max_retries == 0 {
            return Err(Error::config_invalid("max_retries must be at least 1")
                .with_operation("retry::new")
                .with_context("max_retries", "0"));
        }
        Ok(Self {
            max_retries,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        })
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    /// Whether a transient failure on 0-based `attempt` may be retried
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_retries
    }

    /// Wait before the attempt that follows `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_unit.saturating_mul(attempt.saturating_add(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit: DEFAULT_BACKOFF_UNIT,
        }
    }
}
