//! Per-scope circuit breakers.
//!
//! A breaker counts consecutive failures and tracks a sliding window of
//! recent outcomes. Either signal crossing its threshold opens the circuit.
//! An open circuit rejects calls until the open timeout passes, then lets
//! probes through in the half-open state. Enough probe successes close it
//! again; a single probe failure reopens it.

use crate::{CircuitBreakerConfig, Clock, SystemClock};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
pub enum CircuitState {
    /// Calls flow normally.
    #[strum(serialize = "closed")]
    Closed,
    /// Calls are rejected.
    #[strum(serialize = "open")]
    Open,
    /// Probe calls are let through.
    #[strum(serialize = "half-open")]
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_successes: u32,
    opened_at: Option<Instant>,
    window: Vec<bool>,
    window_index: usize,
    window_filled: bool,
}

impl BreakerState {
    fn record(&mut self, success: bool) {
        let len = self.window.len();
        self.window[self.window_index] = success;
        self.window_index = (self.window_index + 1) % len;
        if self.window_index == 0 {
            self.window_filled = true;
        }
    }

    fn failure_rate(&self) -> Option<f64> {
        if !self.window_filled {
            return None;
        }
        let failures = self.window.iter().filter(|ok| !**ok).count();
        Some(failures as f64 / self.window.len() as f64 * 100.0)
    }
}

/// A single circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a breaker on the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a breaker reading time from `clock`.
    ///
    /// Zero thresholds and window sizes fall back to the defaults.
    pub fn with_clock(mut config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        let defaults = CircuitBreakerConfig::default();
        if config.failure_threshold == 0 {
            config.failure_threshold = defaults.failure_threshold;
        }
        if config.success_threshold == 0 {
            config.success_threshold = defaults.success_threshold;
        }
        if config.open_timeout_ms == 0 {
            config.open_timeout_ms = defaults.open_timeout_ms;
        }
        if config.failure_rate_threshold <= 0.0 {
            config.failure_rate_threshold = defaults.failure_rate_threshold;
        }
        if config.sliding_window_size == 0 {
            config.sliding_window_size = defaults.sliding_window_size;
        }

        let state = BreakerState {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            half_open_successes: 0,
            opened_at: None,
            window: vec![true; config.sliding_window_size],
            window_index: 0,
            window_filled: false,
        };

        Self {
            config,
            clock,
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a call may proceed.
    ///
    /// Moves an open circuit to half-open once the open timeout has passed.
    pub fn allow(&self) -> bool {
        let now = self.clock.now();
        let mut state = self.lock();
        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = state
                    .opened_at
                    .is_none_or(|at| now.saturating_duration_since(at) >= self.config.open_timeout());
                if expired {
                    debug!("Circuit half-open, allowing probe");
                    state.state = CircuitState::HalfOpen;
                    state.half_open_successes = 0;
                }
                expired
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut state = self.lock();
        state.record(true);
        match state.state {
            CircuitState::HalfOpen => {
                state.half_open_successes += 1;
                if state.half_open_successes >= self.config.success_threshold {
                    info!("Circuit closed");
                    state.state = CircuitState::Closed;
                    state.consecutive_failures = 0;
                    state.half_open_successes = 0;
                }
            }
            CircuitState::Closed => state.consecutive_failures = 0,
            CircuitState::Open => {}
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        state.record(false);
        match state.state {
            CircuitState::Closed => {
                state.consecutive_failures += 1;
                let rate_tripped = state
                    .failure_rate()
                    .is_some_and(|rate| rate >= self.config.failure_rate_threshold);
                if state.consecutive_failures >= self.config.failure_threshold || rate_tripped {
                    warn!(
                        consecutive_failures = state.consecutive_failures,
                        "Circuit opened"
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!("Probe failed, circuit reopened");
                state.state = CircuitState::Open;
                state.opened_at = Some(now);
                state.half_open_successes = 0;
            }
            CircuitState::Open => state.opened_at = Some(now),
        }
    }

    /// Current state.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }
}

/// Lazily created breakers keyed by scope.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Create a registry on the system clock.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a registry whose breakers read time from `clock`.
    pub fn with_clock(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// Breaker for `scope`, created on first use.
    pub fn get(&self, scope: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
        {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(scope.to_string()).or_insert_with(|| {
            debug!(scope, "Creating circuit breaker");
            Arc::new(CircuitBreaker::with_clock(
                self.config.clone(),
                Arc::clone(&self.clock),
            ))
        }))
    }

    /// Snapshot of every known scope and its state.
    pub fn states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(scope, breaker)| (scope.clone(), breaker.state()))
            .collect()
    }
}
