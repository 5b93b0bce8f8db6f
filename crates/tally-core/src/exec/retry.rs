//! Retry policy: decides backoff delays for failed leaf computations.

use std::time::Duration;

/// Retry policy for leaf execution errors.
///
/// Exponential backoff with a configurable base delay; the attempt budget
/// covers the first execution plus retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier.
    pub multiplier: f64,

    /// Total executions allowed (first attempt included).
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl RetryPolicy {
    /// Delay before the next retry, given how many executions failed so far.
    ///
    /// delay = base_delay * multiplier^(failures - 1)
    ///
    /// With base 2s and multiplier 2.0: 2s, 4s, 8s, 16s, ...
    pub fn next_delay(&self, failures: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let delay_secs = base_secs * self.multiplier.powi(failures.saturating_sub(1) as i32);
        Duration::from_secs_f64(delay_secs)
    }
}
