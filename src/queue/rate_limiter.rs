//! # Item Rate Limiter
//!
//! Per-item exponential failure backoff: `base * 2^failures`, capped at `max`.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

/// Exponential per-item backoff with a failure counter per key
#[derive(Debug)]
pub struct ExponentialRateLimiter<K> {
    base_delay: Duration,
    max_delay: Duration,
    failures: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> ExponentialRateLimiter<K> {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            failures: HashMap::new(),
        }
    }

    /// Records one more failure for `key` and returns how long to wait before retrying it
    pub fn when(&mut self, key: &K) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        let exponent = *failures;
        *failures = failures.saturating_add(1);
        self.delay_for(exponent)
    }

    /// Backoff for the given number of previous failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    pub fn forget(&mut self, key: &K) {
        self.failures.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_failure() {
        let mut limiter =
            ExponentialRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1000));
        let delays: Vec<_> = (0..4).map(|_| limiter.when(&"a")).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
        assert_eq!(limiter.num_requeues(&"a"), 4);
    }

    #[test]
    fn test_backoff_is_capped() {
        let limiter = ExponentialRateLimiter::<&str>::new(
            Duration::from_millis(5),
            Duration::from_millis(100),
        );
        assert_eq!(limiter.delay_for(10), Duration::from_millis(100));
        assert_eq!(limiter.delay_for(64), Duration::from_millis(100));
    }

    #[test]
    fn test_default_schedule_reaches_82s_on_15th_retry() {
        let limiter = ExponentialRateLimiter::<&str>::new(
            Duration::from_millis(5),
            Duration::from_secs(1000),
        );
        assert_eq!(limiter.delay_for(14), Duration::from_millis(81_920));
    }

    #[test]
    fn test_forget_resets_counter() {
        let mut limiter =
            ExponentialRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1));
        limiter.when(&"a");
        limiter.when(&"a");
        limiter.when(&"b");
        limiter.forget(&"a");

        assert_eq!(limiter.num_requeues(&"a"), 0);
        assert_eq!(limiter.num_requeues(&"b"), 1);
        assert_eq!(limiter.when(&"a"), Duration::from_millis(5));
    }
}
