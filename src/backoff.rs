//! Exponential backoff between retry attempts

use std::time::Duration;

use crate::config::ApiConfig;

/// Deterministic exponential backoff without jitter
///
/// The delay before retrying after attempt `n` (0-based) is
/// `min(base * 2^n, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(300), Duration::from_secs(10))
    }
}

impl BackoffPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.retry_delay_base(), config.retry_delay_max())
    }

    /// Delay to wait after the failed attempt `attempt` before trying again
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // saturating so huge attempt numbers clamp instead of overflowing
        let multiplier = 2_u32.saturating_pow(attempt);
        self.base.saturating_mul(multiplier).min(self.max)
    }
}
