//! Retry delays for watcher backend failures.

use std::time::Duration;

use super::BackoffConfig;

/// Exponential backoff with a ceiling.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    attempts: u32,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        Self {
            initial,
            max: max.max(initial),
            multiplier: multiplier.max(1.0),
            attempts: 0,
        }
    }

    /// Delay before the next attempt. Each call counts as one failed attempt.
    pub fn next_delay(&mut self) -> Duration {
        let factor = self.multiplier.powi(self.attempts.min(64) as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        self.attempts = self.attempts.saturating_add(1);
        Duration::from_millis(millis as u64)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive failures since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_ms),
            Duration::from_millis(config.max_ms),
            config.multiplier,
        )
    }
}
