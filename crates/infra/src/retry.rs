//! Bounded retry policy for optimistic-concurrency conflicts.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff strategy for retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed,
    /// Exponential backoff: base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// Linear backoff: base * attempt
    Linear,
}

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries)
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Jitter factor (0.0-1.0); spreads out writers that collided on the same account
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::conflicts(3)
    }
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Self::conflicts(0)
        }
    }

    /// Create a policy with fixed delays.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter: 0.0,
        }
    }

    /// Short exponential backoff used for optimistic-concurrency conflicts.
    pub fn conflicts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(50),
            strategy: BackoffStrategy::Exponential,
            jitter: 0.5,
        }
    }

    /// Delay before the given retry (1-indexed), without jitter.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                let factor = 2u32.saturating_pow(attempt - 1);
                self.base_delay.saturating_mul(factor)
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
        };

        delay.min(self.max_delay)
    }

    /// Delay before the given retry (1-indexed), with jitter applied.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }

        let spread = rand::thread_rng().gen_range(-jitter..=jitter);
        base.mul_f64((1.0 + spread).max(0.0))
    }

    /// Check if more retries are allowed after `attempt` retries have been made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = RetryPolicy::exponential_for_test();
        assert_eq!(policy.base_delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.base_delay_for_attempt(1), Duration::from_millis(10));
        assert_eq!(policy.base_delay_for_attempt(2), Duration::from_millis(20));
        assert_eq!(policy.base_delay_for_attempt(3), Duration::from_millis(40));
        assert_eq!(policy.base_delay_for_attempt(10), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy {
            jitter: 0.5,
            ..RetryPolicy::exponential_for_test()
        };
        for _ in 0..100 {
            let d = policy.delay_for_attempt(1);
            assert!(d >= Duration::from_millis(5) && d <= Duration::from_millis(15));
        }
    }

    #[test]
    fn retries_are_bounded() {
        let policy = RetryPolicy::conflicts(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::no_retry().should_retry(0));
    }

    impl RetryPolicy {
        fn exponential_for_test() -> Self {
            Self {
                max_attempts: 5,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(100),
                strategy: BackoffStrategy::Exponential,
                jitter: 0.0,
            }
        }
    }
}
