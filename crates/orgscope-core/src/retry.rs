use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounded exponential backoff for organization API calls.
///
/// `max_attempts` counts the first try, so the default of 3 means at most two
/// retries. Only errors for which [`ScopeError::is_retryable`] holds are
/// retried.
///
/// [`ScopeError::is_retryable`]: crate::error::ScopeError::is_retryable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (0-based). A server-provided
    /// `Retry-After` replaces the computed backoff but is still capped.
    pub fn delay_for(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let cap = self.max_delay_ms as f64;
        let ms = match retry_after {
            Some(d) => (d.as_millis() as f64).min(cap),
            None => backoff_delay(retry, self.base_delay_ms as f64, cap, self.multiplier),
        };
        Duration::from_millis(ms.max(0.0) as u64)
    }
}

/// min(base * multiplier^retry + jitter, max), jitter = ±5% of the delay.
pub fn backoff_delay(retry: u32, base_delay_ms: f64, max_delay_ms: f64, multiplier: f64) -> f64 {
    // Cap before jitter to avoid infinity/NaN arithmetic
    let delay = (base_delay_ms * multiplier.powi(retry as i32)).min(max_delay_ms);
    let jitter = delay * 0.1 * (rand::random::<f64>() - 0.5);
    (delay + jitter).min(max_delay_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        for _ in 0..20 {
            let d0 = backoff_delay(0, 500.0, 8_000.0, 2.0);
            assert!((475.0..=525.0).contains(&d0), "d0 = {d0}");
            let d2 = backoff_delay(2, 500.0, 8_000.0, 2.0);
            assert!((1_900.0..=2_100.0).contains(&d2), "d2 = {d2}");
            let d10 = backoff_delay(10, 500.0, 8_000.0, 2.0);
            assert!(d10 <= 8_000.0, "d10 = {d10}");
        }
    }

    #[test]
    fn retry_after_overrides_and_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            p.delay_for(0, Some(Duration::from_secs(120))),
            Duration::from_millis(8_000)
        );
    }

    #[test]
    fn attempts_are_bounded() {
        let p = RetryPolicy::default();
        assert!(p.should_retry(1));
        assert!(p.should_retry(2));
        assert!(!p.should_retry(3));
        assert!(!RetryPolicy::none().should_retry(1));
    }
}
