//! Configuration for the feed client.
//!
//! This module provides the [`Config`] struct holding the feed endpoint and
//! connection retry settings.

use std::time::Duration;

use url::Url;

use crate::error::Error;

/// Default feed endpoint: OKX BTC-USDT perpetual L2 depth
pub const DEFAULT_URL: &str = "wss://ws.gomarket-cpp.goquant.io/ws/l2-orderbook/okx/BTC-USDT-SWAP";

/// Environment variable overriding the feed URL
pub const ENV_URL: &str = "L2_FEED_URL";
/// Environment variable overriding the retry count
pub const ENV_MAX_RETRIES: &str = "L2_FEED_MAX_RETRIES";
/// Environment variable overriding the retry delay, in (fractional) seconds
pub const ENV_RETRY_DELAY_SECS: &str = "L2_FEED_RETRY_DELAY_SECS";

/// Configuration for the feed client
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use l2_book_feed::Config;
///
/// let config = Config::default()
///     .with_url("wss://example.test/ws/l2-orderbook/okx/ETH-USDT-SWAP")
///     .with_max_retries(5)
///     .with_retry_delay(Duration::from_millis(500));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Feed endpoint
    url: String,

    /// Retries after the first failed connection attempt
    max_retries: u32,

    /// Fixed delay between connection attempts
    retry_delay: Duration,

    /// Emit an average-latency summary every this many applied messages
    summary_interval: u64,

    /// Number of latency samples kept per tracked operation
    latency_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            summary_interval: 100,
            latency_window: 1000,
        }
    }
}

impl Config {
    /// Create a configuration for the given feed endpoint
    pub fn new(url: impl Into<String>) -> Self {
        Self::default().with_url(url)
    }

    /// Build a configuration from `L2_FEED_*` environment variables
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is set but cannot be parsed,
    /// or if the resulting configuration fails [`Config::validate`].
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_URL) {
            config.url = url;
        }

        if let Some(raw) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_MAX_RETRIES} must be a positive integer, got {raw:?}"))
            })?;
        }

        if let Some(raw) = lookup(ENV_RETRY_DELAY_SECS) {
            let secs: f64 = raw.trim().parse().map_err(|_| {
                Error::Config(format!("{ENV_RETRY_DELAY_SECS} must be a number, got {raw:?}"))
            })?;
            config.retry_delay = Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::Config(format!(
                    "{ENV_RETRY_DELAY_SECS} must be finite and non-negative, got {raw:?}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the feed endpoint
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the number of retries after the first failed attempt
    ///
    /// This counts retries, not attempts: `with_max_retries(3)` allows four
    /// connection attempts in total, so a feed that refuses three times and
    /// then accepts is reached on the fourth. Pass `n - 1` to cap the total
    /// at `n` attempts.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the delay between connection attempts
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Set how often (in applied messages) the latency summary is emitted
    #[must_use]
    pub fn with_summary_interval(mut self, interval: u64) -> Self {
        self.summary_interval = interval;
        self
    }

    /// Set the per-operation latency sample window
    #[must_use]
    pub fn with_latency_window(mut self, samples: usize) -> Self {
        self.latency_window = samples;
        self
    }

    /// Get the feed endpoint
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the retry count
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the retry delay
    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Get the summary interval
    pub fn summary_interval(&self) -> u64 {
        self.summary_interval
    }

    /// Get the latency sample window
    pub fn latency_window(&self) -> usize {
        self.latency_window
    }

    /// Check that the configuration is usable
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL is not a `ws`/`wss` URL, if
    /// `max_retries` is zero, or if the summary interval is zero.
    pub fn validate(&self) -> Result<(), Error> {
        let parsed = Url::parse(&self.url)
            .map_err(|e| Error::Config(format!("invalid feed URL {:?}: {}", self.url, e)))?;

        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(Error::Config(format!(
                "feed URL must use ws:// or wss://, got {}://",
                parsed.scheme()
            )));
        }

        if self.max_retries == 0 {
            return Err(Error::Config("max_retries must be at least 1".to_string()));
        }

        if self.summary_interval == 0 {
            return Err(Error::Config("summary_interval must be at least 1".to_string()));
        }

        Ok(())
    }
}
