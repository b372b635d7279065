//! Decides whether to retry a failed attempt and computes the
//! exponential-backoff delay.

use std::time::Duration;

use crate::error::DownloaderError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// False if the attempt budget is exhausted, or the error kind is
    /// inherently non-retryable (cancellation, malformed URL, decode
    /// failure, 4xx other than 408/429). True for transport errors, 5xx,
    /// 408, and 429.
    pub fn should_retry(&self, error: &DownloaderError, attempt: u32, _url: &str) -> bool {
        if attempt >= self.max_retries {
            return false;
        }
        error.is_retryable_kind()
    }

    /// `min(base * multiplier^(attempt-1), max_delay)` for `attempt >= 1`;
    /// zero for `attempt == 0`.
    pub fn delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_ms = self.base_delay.as_secs_f64() * 1000.0;
        let scaled_ms = base_ms * self.backoff_multiplier.powi(attempt as i32 - 1);
        let capped_ms = scaled_ms.min(self.max_delay.as_secs_f64() * 1000.0);
        Duration::from_secs_f64((capped_ms / 1000.0).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_zero_at_attempt_zero() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(0), Duration::ZERO);
    }

    #[test]
    fn delay_follows_exponential_formula() {
        let policy = RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(40));
    }

    #[test]
    fn delay_is_capped() {
        let policy = RetryPolicy {
            max_retries: 20,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_millis(50),
        };
        assert_eq!(policy.delay(10), Duration::from_millis(50));
    }

    #[test]
    fn exhausted_budget_stops_retrying() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let err = DownloaderError::network("reset", true);
        assert!(!policy.should_retry(&err, 2, "https://x.test"));
        assert!(policy.should_retry(&err, 1, "https://x.test"));
    }

    #[test]
    fn non_retryable_kinds_never_retry() {
        let policy = RetryPolicy::default();
        assert!(!policy.should_retry(&DownloaderError::Cancelled, 0, "https://x.test"));
        assert!(!policy.should_retry(&DownloaderError::decode("bad"), 0, "https://x.test"));
        assert!(!policy.should_retry(&DownloaderError::invalid_url("empty"), 0, "https://x.test"));
    }

    #[test]
    fn retryable_kinds_retry_within_budget() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(&DownloaderError::from_status(503), 0, "https://x.test"));
        assert!(policy.should_retry(&DownloaderError::from_status(429), 0, "https://x.test"));
        assert!(!policy.should_retry(&DownloaderError::from_status(400), 0, "https://x.test"));
    }

    proptest::proptest! {
        /// Whatever the policy's knobs are, the delay never exceeds
        /// `max_delay` and is non-decreasing as the attempt number grows
        /// (multiplier >= 1 here; strictly-decaying multipliers are outside
        /// what `RetryPolicy` models).
        #[test]
        fn delay_never_exceeds_max_and_is_non_decreasing(
            base_ms in 1u64..5_000,
            multiplier in 1.0f64..4.0,
            max_ms in 1u64..60_000,
            attempt in 1u32..20,
        ) {
            let policy = RetryPolicy {
                max_retries: 20,
                base_delay: Duration::from_millis(base_ms),
                backoff_multiplier: multiplier,
                max_delay: Duration::from_millis(max_ms),
            };
            let this = policy.delay(attempt);
            let next = policy.delay(attempt + 1);
            prop_assert!(this <= policy.max_delay);
            prop_assert!(next >= this);
        }

        /// `delay(0)` is always zero, regardless of the other knobs --
        /// there is no backoff before the first attempt.
        #[test]
        fn delay_at_zero_is_always_zero(
            base_ms in 1u64..5_000,
            multiplier in 1.0f64..4.0,
            max_ms in 1u64..60_000,
        ) {
            let policy = RetryPolicy {
                max_retries: 20,
                base_delay: Duration::from_millis(base_ms),
                backoff_multiplier: multiplier,
                max_delay: Duration::from_millis(max_ms),
            };
            prop_assert_eq!(policy.delay(0), Duration::ZERO);
        }
    }
}
