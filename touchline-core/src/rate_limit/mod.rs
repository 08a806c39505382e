//! Token-bucket throttling for provider calls.
//!
//! A [`RateLimiter`] holds up to `capacity` tokens and refills continuously
//! at `capacity / period` tokens per unit of time. [`RateLimiter::acquire`]
//! never fails; it sleeps until a token is available. Several limiters are
//! combined in [`RateLimiters`], where every tier must grant before a call
//! proceeds.
//!
//! Token accounting uses integer arithmetic. One token is represented as
//! `period` nanoseconds' worth of units, so refilling for `elapsed`
//! nanoseconds adds exactly `elapsed * capacity` units with no rounding.
#![forbid(unsafe_code)]

mod clock;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::debug;
use thiserror::Error;

pub use clock::{Clock, SystemClock};

/// Errors raised when configuring a limit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Capacity must be at least one call.
    #[error("rate limit capacity must be positive")]
    ZeroCapacity,
    /// Period must be non-zero.
    #[error("rate limit period must be positive")]
    ZeroPeriod,
}

/// A validated `capacity` calls per `period` limit.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use touchline_core::RateLimit;
///
/// let burst = RateLimit::new(100, Duration::from_secs(10)).expect("valid limit");
/// assert_eq!(burst.capacity(), 100);
/// assert!(RateLimit::new(0, Duration::from_secs(10)).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    capacity: u32,
    period: Duration,
}

impl RateLimit {
    /// Validate a limit of `capacity` calls per `period`.
    ///
    /// # Errors
    ///
    /// Rejects a zero capacity or a zero period.
    pub const fn new(capacity: u32, period: Duration) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        if period.is_zero() {
            return Err(RateLimitError::ZeroPeriod);
        }
        Ok(Self { capacity, period })
    }

    /// Maximum number of stored tokens.
    #[must_use]
    pub const fn capacity(self) -> u32 {
        self.capacity
    }

    /// Time needed to refill an empty bucket.
    #[must_use]
    pub const fn period(self) -> Duration {
        self.period
    }

    const fn token(self) -> u128 {
        self.period.as_nanos()
    }

    const fn ceiling(self) -> u128 {
        self.token().saturating_mul(self.capacity as u128)
    }
}

#[derive(Debug)]
struct Bucket {
    level: u128,
    last_refill: Duration,
}

impl Bucket {
    fn refill(&mut self, now: Duration, limit: RateLimit) {
        let elapsed = now.saturating_sub(self.last_refill).as_nanos();
        let gained = elapsed.saturating_mul(u128::from(limit.capacity));
        self.level = self.level.saturating_add(gained).min(limit.ceiling());
        self.last_refill = self.last_refill.max(now);
    }
}

/// One token-bucket tier.
#[derive(Debug)]
pub struct RateLimiter {
    label: String,
    limit: RateLimit,
    clock: Arc<dyn Clock>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full bucket for `limit` reading time from `clock`.
    #[must_use]
    pub fn new(label: impl Into<String>, limit: RateLimit, clock: Arc<dyn Clock>) -> Self {
        let last_refill = clock.now();
        Self {
            label: label.into(),
            limit,
            clock,
            bucket: Mutex::new(Bucket {
                level: limit.ceiling(),
                last_refill,
            }),
        }
    }

    /// Name used in diagnostics.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Configured limit.
    #[must_use]
    pub const fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Take one token, sleeping until one is available.
    ///
    /// Returns how long the caller was blocked. When the bucket is short,
    /// the caller sleeps for the deficit scaled by `period / capacity` and
    /// the bucket is left empty. The refill, deduct and sleep all happen
    /// under one lock so concurrent callers never share a token.
    pub fn acquire(&self) -> Duration {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        bucket.refill(now, self.limit);

        let token = self.limit.token();
        if bucket.level >= token {
            bucket.level -= token;
            return Duration::ZERO;
        }

        let deficit = token - bucket.level;
        let nanos = deficit.div_ceil(u128::from(self.limit.capacity));
        let wait = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        debug!("rate limiter {} waiting {wait:?}", self.label);
        self.clock.sleep(wait);
        bucket.level = 0;
        bucket.last_refill = now.saturating_add(wait);
        wait
    }

    /// Whole tokens currently available.
    #[must_use]
    pub fn available(&self) -> u32 {
        let mut bucket = self.bucket.lock().unwrap_or_else(PoisonError::into_inner);
        bucket.refill(self.clock.now(), self.limit);
        let whole = bucket.level.checked_div(self.limit.token()).unwrap_or(0);
        u32::try_from(whole).unwrap_or(u32::MAX)
    }
}

/// Ordered set of tiers guarding the same calls.
#[derive(Debug, Default)]
pub struct RateLimiters {
    tiers: Vec<RateLimiter>,
}

impl RateLimiters {
    /// No limits at all.
    #[must_use]
    pub const fn unlimited() -> Self {
        Self { tiers: Vec::new() }
    }

    /// Add a tier. Tiers are acquired in insertion order.
    #[must_use]
    pub fn with_tier(mut self, tier: RateLimiter) -> Self {
        self.tiers.push(tier);
        self
    }

    /// Configured tiers.
    #[must_use]
    pub fn tiers(&self) -> &[RateLimiter] {
        &self.tiers
    }

    /// Acquire one token from every tier in order.
    ///
    /// Later tiers keep refilling while earlier ones sleep, so the total
    /// wait tracks the slowest tier rather than the sum of all of them.
    pub fn acquire(&self) -> Duration {
        self.tiers
            .iter()
            .fold(Duration::ZERO, |total, tier| total.saturating_add(tier.acquire()))
    }
}

#[cfg(test)]
mod tests;
