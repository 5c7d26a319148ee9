//! Retry policy for transient control API errors.

use std::time::Duration;

/// Bounded exponential backoff configuration.
///
/// No jitter: the scheduler runs at most twice a day against two
/// resources, so synchronized retries are not a concern.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per call, including the first.
    pub max_attempts: u32,

    /// Base delay for the first retry.
    pub base: Duration,

    /// Maximum delay.
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            max: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Load overrides from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_attempts = std::env::var("ENVCTL_RETRY_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_attempts);

        let base = std::env::var("ENVCTL_RETRY_BASE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base);

        Self {
            max_attempts,
            base,
            max: defaults.max,
        }
    }

    /// Calculate the delay before the retry following `attempt`
    /// (zero-based: the first retry waits `base`).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base.as_millis() as f64 * 2.0_f64.powi(attempt as i32);
        let delay = delay.min(self.max.as_millis() as f64);
        Duration::from_millis(delay as u64)
    }
}
