//! Connection retry policies.
//!
//! The client asks a [`RetryPolicy`] how many retries it may make and how long
//! to wait before each one. [`FixedDelay`] is the default; [`ExponentialBackoff`]
//! can be swapped in without changing the client.

use std::fmt;
use std::time::Duration;

use crate::config::Config;

/// Strategy deciding how often and how fast to retry a failed connect
pub trait RetryPolicy: Send + Sync + fmt::Debug {
    /// Retries allowed after the first failed attempt
    fn max_retries(&self) -> u32;

    /// Delay before retry number `retry` (0-based)
    fn delay_for_retry(&self, retry: u32) -> Duration;

    /// Total connection attempts, including the first
    fn max_attempts(&self) -> u32 {
        self.max_retries().saturating_add(1)
    }
}

/// Same delay before every retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before each retry
    pub delay: Duration,
}

impl FixedDelay {
    /// Create a fixed-delay policy
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

impl From<&Config> for FixedDelay {
    fn from(config: &Config) -> Self {
        Self::new(config.max_retries(), config.retry_delay())
    }
}

impl RetryPolicy for FixedDelay {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn delay_for_retry(&self, _retry: u32) -> Duration {
        self.delay
    }
}

/// Exponentially growing delay, capped
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any delay
    pub max_delay_ms: u64,
    /// Growth factor between retries
    pub backoff_multiplier: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl ExponentialBackoff {
    /// Create a policy with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum retries
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set initial delay in milliseconds
    #[must_use]
    pub fn initial_delay_ms(mut self, ms: u64) -> Self {
        self.initial_delay_ms = ms;
        self
    }

    /// Set maximum delay in milliseconds
    #[must_use]
    pub fn max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set backoff multiplier
    #[must_use]
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let delay_ms = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}
