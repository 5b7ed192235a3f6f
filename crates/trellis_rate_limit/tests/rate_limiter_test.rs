//! Behavioural tests for the token bucket and slow-down window.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_rate_limit::{ManualClock, RateLimitConfig, RateLimiter, Reservation};

fn manual(rate: f64, burst: u32, respect_retry_after: bool) -> (RateLimiter, ManualClock) {
    let clock = ManualClock::new();
    let config = RateLimitConfig {
        requests_per_second: rate,
        burst_size: burst,
        respect_retry_after,
        ..Default::default()
    };
    (RateLimiter::with_clock(config, Arc::new(clock.clone())), clock)
}

#[test]
fn test_burst_admits_five_in_a_row() {
    let (limiter, _clock) = manual(100.0, 5, true);
    for _ in 0..5 {
        assert!(limiter.allow());
    }
}

#[test]
fn test_third_call_refused_when_burst_is_two() {
    let (limiter, _clock) = manual(1.0, 2, true);
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(!limiter.allow());
}

#[test]
fn test_refill_after_200ms() {
    let (limiter, clock) = manual(10.0, 2, true);
    assert!(limiter.allow());
    assert!(limiter.allow());
    assert!(!limiter.allow());

    clock.advance(Duration::from_millis(200));
    assert!(limiter.allow());
}

#[test]
fn test_slow_down_window_blocks_then_expires() {
    let (limiter, clock) = manual(50.0, 10, true);
    limiter.set_retry_after(Duration::from_secs(5));

    assert!(!limiter.allow());
    let remaining = limiter.retry_after_remaining();
    assert!(remaining > Duration::ZERO);
    assert!(remaining <= Duration::from_secs(5));

    clock.advance(Duration::from_secs(6));
    assert_eq!(limiter.retry_after_remaining(), Duration::ZERO);
    assert!(limiter.allow());
}

#[test]
fn test_slow_down_ignored_when_disabled() {
    let (limiter, _clock) = manual(50.0, 10, false);
    limiter.set_retry_after(Duration::from_secs(5));
    assert_eq!(limiter.retry_after_remaining(), Duration::ZERO);
    assert!(limiter.allow());
}

#[test]
fn test_tokens_never_exceed_burst() {
    let (limiter, clock) = manual(100.0, 3, true);
    clock.advance(Duration::from_secs(60));
    assert!(limiter.tokens() <= 3.0);
    for _ in 0..3 {
        assert!(limiter.allow());
    }
    assert!(!limiter.allow());
}

#[test]
fn test_idle_bucket_refills_at_rate() {
    let (limiter, clock) = manual(4.0, 10, true);
    for _ in 0..10 {
        assert!(limiter.allow());
    }
    clock.advance(Duration::from_millis(750));
    // min(burst, rate * t) = 3
    assert!(limiter.tokens() >= 3.0 - 1e-9);
    for _ in 0..3 {
        assert!(limiter.allow());
    }
    assert!(!limiter.allow());
}

#[test]
fn test_reserve_ready_matches_allow() {
    let (limiter, clock) = manual(2.0, 2, true);
    for step in 0..20 {
        let ready = limiter.reserve().is_ready();
        assert_eq!(ready, limiter.allow(), "mismatch at step {}", step);
        clock.advance(Duration::from_millis(130));
    }
}

#[test]
fn test_reserve_blocked_during_long_window() {
    let (limiter, clock) = manual(50.0, 10, true);
    limiter.set_retry_after(Duration::from_secs(5));
    assert_eq!(limiter.reserve(), Reservation::Blocked);

    clock.advance(Duration::from_millis(4_500));
    assert!(matches!(limiter.reserve(), Reservation::Wait(_)));

    clock.advance(Duration::from_millis(600));
    assert_eq!(limiter.reserve(), Reservation::Ready);
}

#[test]
fn test_reserve_does_not_consume() {
    let (limiter, _clock) = manual(1.0, 1, true);
    assert_eq!(limiter.reserve(), Reservation::Ready);
    assert_eq!(limiter.reserve(), Reservation::Ready);
    assert!(limiter.allow());
}

#[tokio::test]
async fn test_concurrent_callers_share_one_bucket() {
    let (limiter, _clock) = manual(1.0, 8, true);
    let limiter = Arc::new(limiter);

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.allow() })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 8);
}

#[tokio::test(start_paused = true)]
async fn test_wait_suspends_until_token() {
    let limiter = RateLimiter::new(RateLimitConfig {
        requests_per_second: 10.0,
        burst_size: 1,
        ..Default::default()
    });
    let cancel = CancellationToken::new();

    let start = tokio::time::Instant::now();
    limiter.wait(&cancel).await.unwrap();
    limiter.wait(&cancel).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_wait_honours_slow_down_window() {
    let limiter = RateLimiter::new(RateLimitConfig::default());
    let cancel = CancellationToken::new();
    limiter.set_retry_after(Duration::from_secs(2));

    let start = tokio::time::Instant::now();
    limiter.wait(&cancel).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_wait_keeps_token_count() {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        requests_per_second: 1.0,
        burst_size: 1,
        ..Default::default()
    }));
    let cancel = CancellationToken::new();
    limiter.wait(&cancel).await.unwrap();
    limiter.set_retry_after(Duration::from_secs(30));

    let waiter = {
        let limiter = Arc::clone(&limiter);
        let cancel = cancel.clone();
        tokio::spawn(async move { limiter.wait(&cancel).await })
    };

    tokio::time::sleep(Duration::from_secs(5)).await;
    let before = limiter.tokens();
    cancel.cancel();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(err.is_cancelled());
    assert!(limiter.tokens() >= before);
    assert!(limiter.tokens() >= 1.0 - 1e-9);
}

#[tokio::test]
async fn test_wait_returns_immediately_when_already_cancelled() {
    let limiter = RateLimiter::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = limiter.wait(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!((limiter.tokens() - 10.0).abs() < 1e-9);
}
