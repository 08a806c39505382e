//! Unit and property tests for the token-bucket limiter.

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rstest::{fixture, rstest};

use super::*;
use crate::test_support::ManualClock;

#[fixture]
fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::default())
}

fn limiter(clock: &Arc<ManualClock>, capacity: u32, period_secs: u64) -> RateLimiter {
    let limit = RateLimit::new(capacity, Duration::from_secs(period_secs))
        .unwrap_or_else(|err| panic!("invalid limit: {err}"));
    RateLimiter::new("test", limit, Arc::clone(clock) as Arc<dyn Clock>)
}

#[rstest]
fn full_bucket_grants_capacity_without_waiting(clock: Arc<ManualClock>) {
    let limiter = limiter(&clock, 5, 10);
    for _ in 0..5 {
        assert_eq!(limiter.acquire(), Duration::ZERO);
    }
    assert_eq!(limiter.available(), 0);
    assert!(clock.sleeps().is_empty());
}

#[rstest]
fn empty_bucket_waits_one_refill_quantum(clock: Arc<ManualClock>) {
    let limiter = limiter(&clock, 5, 10);
    for _ in 0..5 {
        limiter.acquire();
    }
    assert_eq!(limiter.acquire(), Duration::from_secs(2));
    assert_eq!(clock.now(), Duration::from_secs(2));
    assert_eq!(limiter.available(), 0);
}

#[rstest]
fn partial_refill_shortens_the_wait(clock: Arc<ManualClock>) {
    let limiter = limiter(&clock, 5, 10);
    for _ in 0..5 {
        limiter.acquire();
    }
    clock.advance(Duration::from_millis(1_500));
    assert_eq!(limiter.acquire(), Duration::from_millis(500));
}

#[rstest]
fn refill_is_capped_at_capacity(clock: Arc<ManualClock>) {
    let limiter = limiter(&clock, 3, 3);
    limiter.acquire();
    clock.advance(Duration::from_secs(3_600));
    assert_eq!(limiter.available(), 3);
}

#[rstest]
fn sustained_demand_stays_within_one_quantum(clock: Arc<ManualClock>) {
    let limiter = limiter(&clock, 5, 10);
    let mut grants = Vec::new();
    for _ in 0..30 {
        limiter.acquire();
        grants.push(clock.now());
    }
    let period = Duration::from_secs(10);
    let first_wait = grants
        .iter()
        .position(|grant| !grant.is_zero())
        .unwrap_or_else(|| panic!("demand never waited"));
    for (start, at) in grants.iter().enumerate().skip(first_wait) {
        let in_window = grants
            .iter()
            .skip(start)
            .take_while(|grant| grant.saturating_sub(*at) <= period)
            .count();
        assert!(in_window <= 6, "window starting at {at:?} held {in_window} calls");
    }
}

#[rstest]
fn tiers_wait_for_the_slowest(clock: Arc<ManualClock>) {
    let limits = RateLimiters::unlimited()
        .with_tier(limiter(&clock, 10, 1))
        .with_tier(limiter(&clock, 2, 10));
    assert_eq!(limits.acquire(), Duration::ZERO);
    assert_eq!(limits.acquire(), Duration::ZERO);
    // The burst tier has tokens; the slow tier needs five seconds.
    assert_eq!(limits.acquire(), Duration::from_secs(5));
    assert_eq!(clock.now(), Duration::from_secs(5));
}

#[rstest]
fn unlimited_never_waits() {
    let limits = RateLimiters::unlimited();
    assert_eq!(limits.acquire(), Duration::ZERO);
}

#[rstest]
#[case(0, 10, RateLimitError::ZeroCapacity)]
#[case(5, 0, RateLimitError::ZeroPeriod)]
fn rejects_degenerate_limits(
    #[case] capacity: u32,
    #[case] period_secs: u64,
    #[case] expected: RateLimitError,
) {
    assert_eq!(
        RateLimit::new(capacity, Duration::from_secs(period_secs)),
        Err(expected)
    );
}

#[rstest]
fn concurrent_callers_never_share_a_token() {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::default());
    let limit = RateLimit::new(8, Duration::from_secs(60))
        .unwrap_or_else(|err| panic!("invalid limit: {err}"));
    let limiter = Arc::new(RateLimiter::new("shared", limit, clock));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = Arc::clone(&limiter);
            std::thread::spawn(move || (0..2).map(|_| shared.acquire()).collect::<Vec<_>>())
        })
        .collect();
    let waits: Vec<Duration> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap_or_else(|_| panic!("worker panicked")))
        .collect();
    assert!(waits.iter().all(Duration::is_zero));
    assert_eq!(limiter.available(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Grants in any interval never exceed the bucket's burst plus what the
    /// interval could refill.
    #[test]
    fn grants_respect_token_bucket_bound(
        capacity in 1_u32..8,
        period_secs in 1_u64..20,
        gaps in prop::collection::vec(0_u64..3_000, 1..120),
    ) {
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(&clock, capacity, period_secs);
        let mut grants = Vec::with_capacity(gaps.len());
        for gap in gaps {
            clock.advance(Duration::from_millis(gap));
            limiter.acquire();
            grants.push(clock.now().as_nanos());
        }

        let capacity = u128::from(capacity);
        let period = u128::from(period_secs) * 1_000_000_000;
        for (i, first) in grants.iter().enumerate() {
            for (offset, last) in grants.iter().enumerate().skip(i) {
                let count = (offset - i + 1) as u128;
                let allowance = capacity * period + (last - first) * capacity;
                prop_assert!(
                    count * period <= allowance,
                    "{count} grants between {first}ns and {last}ns"
                );
            }
        }
    }
}
