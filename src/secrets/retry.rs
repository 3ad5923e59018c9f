//! Exponential backoff policy for remote fetches.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Static retry configuration shared by all fetch attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the failed attempt number `attempt` (1-based).
    ///
    /// `min(base_delay * backoff_multiplier^(attempt-1), max_delay)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(0.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);

        if capped.is_finite() && capped >= 0.0 {
            Duration::from_millis(capped as u64)
        } else {
            self.max_delay
        }
    }

    /// Whether another attempt is allowed after `attempt` attempts were made.
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts.max(1)
    }

    /// Sum of the delays a fetch that uses every attempt will sleep for.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts.max(1)).map(|attempt| self.delay_for(attempt)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_delays_double() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(10_000));
    }

    #[test]
    fn test_attempt_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.has_attempts_left(1));
        assert!(policy.has_attempts_left(2));
        assert!(!policy.has_attempts_left(3));

        assert!(!RetryPolicy::no_retry().has_attempts_left(1));
    }

    #[test]
    fn test_total_backoff() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
            backoff_multiplier: 2.0,
        };
        // 10 + 20 + 25
        assert_eq!(policy.total_backoff(), Duration::from_millis(55));
    }

    proptest! {
        #[test]
        fn delay_never_exceeds_max(
            attempt in 1u32..64,
            base in 0u64..5_000,
            max in 0u64..60_000,
            multiplier in 0.0f64..8.0,
        ) {
            let policy = RetryPolicy {
                max_attempts: 64,
                base_delay: Duration::from_millis(base),
                max_delay: Duration::from_millis(max),
                backoff_multiplier: multiplier,
            };
            prop_assert!(policy.delay_for(attempt) <= Duration::from_millis(max));
        }
    }
}
