//! Bounded exponential backoff for transient fetch failures.

use std::time::Duration;

/// Default number of attempts per request, the first one included.
pub const DEFAULT_ATTEMPTS: u32 = 3;

/// How often and how patiently a request is retried.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use touchline_data::RetryPolicy;
///
/// let policy = RetryPolicy::new(4, Duration::from_secs(1), Duration::from_secs(3));
/// assert_eq!(policy.delay(1), Duration::from_secs(1));
/// assert_eq!(policy.delay(2), Duration::from_secs(2));
/// assert_eq!(policy.delay(3), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ATTEMPTS,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
    }
}

impl RetryPolicy {
    /// Allow `attempts` tries in total, waiting `initial_backoff` before the
    /// first retry and doubling up to `max_backoff`.
    ///
    /// An `attempts` of zero is treated as one.
    #[must_use]
    pub const fn new(attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            initial_backoff,
            max_backoff,
        }
    }

    /// Never retry.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Total attempts per request.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Longest wait between attempts.
    #[must_use]
    pub const fn max_backoff(&self) -> Duration {
        self.max_backoff
    }

    /// Wait before retry number `retry` (starting at 1).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let doublings = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1_u32 << doublings)
            .min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1, 500)]
    #[case(2, 1_000)]
    #[case(3, 2_000)]
    #[case(6, 10_000)]
    #[case(40, 10_000)]
    fn delays_double_until_capped(#[case] retry: u32, #[case] millis: u64) {
        let policy = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(10));
        assert_eq!(policy.delay(retry), Duration::from_millis(millis));
    }

    #[rstest]
    fn zero_attempts_still_tries_once() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).attempts(), 1);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }
}
