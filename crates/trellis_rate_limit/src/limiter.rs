//! Token bucket rate limiter with a client-wide slow-down window.
//!
//! The bucket starts full, refills continuously at `requests_per_second`
//! up to `burst_size`, and each admitted request consumes one token.
//! Independently of the tokens, a server slow-down signal arms a window
//! during which nothing is admitted. The window is shared by every caller
//! of the limiter, so one `429` throttles the whole client.

use crate::{Clock, RateLimitConfig, SystemClock};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace, warn};
use trellis_error::ResilienceError;

/// Slack added to computed token waits so the next check lands after the
/// token exists rather than a hair before it.
const WAIT_SLACK: Duration = Duration::from_millis(1);

/// Longest single sleep in [`RateLimiter::wait`]. Token waits beyond this
/// are taken in slices, re-checking the bucket between them.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(3600);

/// Answer from [`RateLimiter::reserve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    /// A token is available right now.
    Ready,
    /// A token will be available after this short wait.
    Wait(Duration),
    /// Nothing will be admitted within the reserve ceiling; do not poll.
    Blocked,
}

impl Reservation {
    /// True when an immediate [`RateLimiter::allow`] would succeed.
    pub fn is_ready(&self) -> bool {
        matches!(self, Reservation::Ready)
    }
}

/// Mutable bucket state, guarded by the limiter's mutex.
#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    blocked_until: Option<Instant>,
}

impl BucketState {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        self.last_refill = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * rate).min(burst);
    }
}

/// Token bucket shared by all outbound requests of one client.
///
/// All methods take `&self`; the bucket is guarded by a mutex held only for
/// the refill-and-consume step, never across an await.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use trellis_rate_limit::{ManualClock, RateLimitConfig, RateLimiter};
///
/// let clock = ManualClock::new();
/// let config = RateLimitConfig {
///     requests_per_second: 10.0,
///     burst_size: 2,
///     ..Default::default()
/// };
/// let limiter = RateLimiter::with_clock(config, Arc::new(clock.clone()));
///
/// assert!(limiter.allow());
/// assert!(limiter.allow());
/// assert!(!limiter.allow());
///
/// clock.advance(Duration::from_millis(200));
/// assert!(limiter.allow());
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter reading time from `clock`.
    ///
    /// A non-positive rate or zero burst is replaced by the default, since
    /// such a bucket could never admit anything.
    pub fn with_clock(mut config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let defaults = RateLimitConfig::default();
        if !config.requests_per_second.is_finite() || config.requests_per_second <= 0.0 {
            warn!(
                requests_per_second = config.requests_per_second,
                "Invalid rate, using default"
            );
            config.requests_per_second = defaults.requests_per_second;
        }
        if config.burst_size == 0 {
            warn!("Zero burst size, using default");
            config.burst_size = defaults.burst_size;
        }

        debug!(
            requests_per_second = config.requests_per_second,
            burst_size = config.burst_size,
            respect_retry_after = config.respect_retry_after,
            "Creating rate limiter"
        );

        let state = BucketState {
            tokens: f64::from(config.burst_size),
            last_refill: clock.now(),
            blocked_until: None,
        };

        Self {
            config,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Effective configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn burst(&self) -> f64 {
        f64::from(self.config.burst_size)
    }

    /// Time until `tokens` refills to one, `None` if too far off to represent.
    fn token_wait(&self, tokens: f64) -> Option<Duration> {
        Duration::try_from_secs_f64((1.0 - tokens) / self.config.requests_per_second).ok()
    }

    /// Remaining slow-down time at `now`, clearing an expired window.
    ///
    /// Always `None` when retry-after handling is disabled.
    fn window_remaining(&self, state: &mut BucketState, now: Instant) -> Option<Duration> {
        if !self.config.respect_retry_after {
            return None;
        }
        let until = state.blocked_until?;
        if now < until {
            Some(until - now)
        } else {
            state.blocked_until = None;
            None
        }
    }

    /// Try to admit one request without waiting.
    ///
    /// Refills the bucket, then refuses while a slow-down window is active.
    /// Otherwise consumes a token if at least one is available.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        state.refill(now, self.config.requests_per_second, self.burst());

        if self.window_remaining(&mut state, now).is_some() {
            trace!("Refusing request during slow-down window");
            return false;
        }

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Report how long until a request could be admitted, without consuming.
    ///
    /// Returns [`Reservation::Ready`] exactly when an immediate
    /// [`allow`](Self::allow) would succeed. Waits beyond the configured
    /// ceiling, including long slow-down windows, are [`Reservation::Blocked`].
    pub fn reserve(&self) -> Reservation {
        let now = self.clock.now();
        let mut state = self.lock();
        state.refill(now, self.config.requests_per_second, self.burst());

        let window = self.window_remaining(&mut state, now);
        if window.is_none() && state.tokens >= 1.0 {
            return Reservation::Ready;
        }

        let token_wait = if state.tokens >= 1.0 {
            Duration::ZERO
        } else {
            match self.token_wait(state.tokens) {
                Some(wait) => wait,
                None => return Reservation::Blocked,
            }
        };
        let wait = window.unwrap_or(Duration::ZERO).max(token_wait);

        if wait > self.config.max_reserve_wait() {
            Reservation::Blocked
        } else {
            Reservation::Wait(wait)
        }
    }

    /// Wait until a token is available, then consume it.
    ///
    /// # Errors
    ///
    /// Returns a cancellation error as soon as `cancel` fires. No token is
    /// consumed in that case.
    #[instrument(skip(self, cancel))]
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), ResilienceError> {
        loop {
            if cancel.is_cancelled() {
                return Err(ResilienceError::cancelled());
            }

            let delay = {
                let now = self.clock.now();
                let mut state = self.lock();
                state.refill(now, self.config.requests_per_second, self.burst());

                if let Some(remaining) = self.window_remaining(&mut state, now) {
                    debug!(?remaining, "Waiting out slow-down window");
                    remaining
                } else if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return Ok(());
                } else {
                    self.token_wait(state.tokens).map_or(MAX_WAIT_SLICE, |wait| {
                        wait.saturating_add(WAIT_SLACK).min(MAX_WAIT_SLICE)
                    })
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ResilienceError::cancelled()),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Arm the slow-down window for `duration` from now.
    ///
    /// Affects every caller of this limiter. A window only ever extends;
    /// a shorter signal never cuts an active one short. No-op when
    /// retry-after handling is disabled.
    pub fn set_retry_after(&self, duration: Duration) {
        if !self.config.respect_retry_after {
            return;
        }
        let until = self.clock.now() + duration;
        let mut state = self.lock();
        if state.blocked_until.is_none_or(|current| until > current) {
            debug!(?duration, "Slow-down window armed");
            state.blocked_until = Some(until);
        }
    }

    /// Time left in the active slow-down window, zero if none.
    pub fn retry_after_remaining(&self) -> Duration {
        if !self.config.respect_retry_after {
            return Duration::ZERO;
        }
        let now = self.clock.now();
        self.lock()
            .blocked_until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Current token count, for observability only.
    ///
    /// Reports the refilled value without changing the bucket.
    pub fn tokens(&self) -> f64 {
        let now = self.clock.now();
        let state = self.lock();
        let elapsed = now.saturating_duration_since(state.last_refill);
        (state.tokens + elapsed.as_secs_f64() * self.config.requests_per_second).min(self.burst())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
