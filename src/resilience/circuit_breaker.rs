//! # Circuit Breaker Implementation
//!
//! Count-based sliding-window circuit breaker with three states: Closed
//! (normal operation), Open (failing fast), and Half-Open (trial calls
//! permitted). Failure rate is evaluated over the outcomes of the last W
//! calls once a minimum sample size has been observed.

use crate::resilience::CircuitBreakerConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - limited calls allowed to test system health
    HalfOpen = 2,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls before they reach the remote.
    /// Distinguished from a genuine operation failure so callers do not
    /// retry it or count it as a new failure.
    #[error("circuit breaker is open for {operation}")]
    CircuitOpen { operation: String },

    /// Operation executed and failed; recorded against the window.
    #[error("operation failed: {0}")]
    OperationFailed(E),
}

/// Sliding window of recent call outcomes plus half-open bookkeeping.
#[derive(Debug, Default)]
struct CallWindow {
    outcomes: VecDeque<bool>,
    failures: usize,
    half_open_attempts: u32,
}

impl CallWindow {
    fn record(&mut self, success: bool, capacity: usize) {
        self.outcomes.push_back(success);
        if !success {
            self.failures += 1;
        }
        while self.outcomes.len() > capacity {
            if let Some(evicted) = self.outcomes.pop_front() {
                if !evicted {
                    self.failures -= 1;
                }
            }
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failures as f64 / self.outcomes.len() as f64 * 100.0
    }

    fn reset(&mut self) {
        self.outcomes.clear();
        self.failures = 0;
        self.half_open_attempts = 0;
    }
}

/// Core circuit breaker with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Operation name for logging and registry keying
    name: String,

    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,

    /// Configuration parameters
    config: CircuitBreakerConfig,

    /// Recent call outcomes protected by mutex
    window: Mutex<CallWindow>,

    /// Time when circuit was opened (for open-duration expiry)
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given name and configuration
    pub fn new(name: String, config: CircuitBreakerConfig) -> Self {
        info!(
            operation = %name,
            failure_rate_threshold = config.failure_rate_threshold,
            sliding_window_size = config.sliding_window_size,
            minimum_calls = config.minimum_calls,
            open_duration_ms = config.open_duration.as_millis() as u64,
            "Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            config,
            window: Mutex::new(CallWindow::default()),
            opened_at: Mutex::new(None),
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get operation name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failure rate in percent over the current window, if any calls have
    /// been recorded.
    pub fn failure_rate(&self) -> Option<f64> {
        let window = self.window.lock();
        if window.outcomes.is_empty() {
            None
        } else {
            Some(window.failure_rate())
        }
    }

    /// Execute an operation with circuit breaker protection.
    ///
    /// While the breaker is open, the operation is not invoked at all and
    /// [`CircuitBreakerError::CircuitOpen`] is returned immediately.
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_call() {
            return Err(CircuitBreakerError::CircuitOpen {
                operation: self.name.clone(),
            });
        }

        let result = operation().await;

        match &result {
            Ok(_) => self.record_success(),
            Err(_) => self.record_failure(),
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Check if a call should be allowed based on current state
    fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock();
                match opened_at {
                    Some(opened) if opened.elapsed() >= self.config.open_duration => {
                        self.transition_to_half_open();
                        // The transition reset the attempt budget; consume one.
                        self.window.lock().half_open_attempts = 1;
                        true
                    }
                    Some(_) => false,
                    None => {
                        warn!(operation = %self.name, "circuit open but no timestamp recorded");
                        true
                    }
                }
            }
            CircuitState::HalfOpen => {
                let mut window = self.window.lock();
                if window.half_open_attempts < self.config.half_open_permits {
                    window.half_open_attempts += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful operation
    fn record_success(&self) {
        match self.state() {
            CircuitState::HalfOpen => {
                // A trial call succeeded, the remote has recovered.
                self.transition_to_closed();
            }
            _ => {
                self.window
                    .lock()
                    .record(true, self.config.sliding_window_size);
            }
        }
    }

    /// Record a failed operation
    fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let should_open = {
                    let mut window = self.window.lock();
                    window.record(false, self.config.sliding_window_size);
                    window.outcomes.len() >= self.config.minimum_calls
                        && window.failure_rate() >= self.config.failure_rate_threshold
                };
                if should_open {
                    self.transition_to_open();
                }
            }
            CircuitState::HalfOpen => {
                // Any failure during a trial call immediately reopens.
                self.transition_to_open();
            }
            CircuitState::Open => {
                // Already open; the in-flight call raced the transition.
                debug!(operation = %self.name, "failure recorded while circuit already open");
            }
        }
    }

    fn transition_to_closed(&self) {
        self.state
            .store(CircuitState::Closed as u8, Ordering::Release);
        self.window.lock().reset();
        *self.opened_at.lock() = None;

        info!(operation = %self.name, "Circuit breaker closed (recovered)");
    }

    fn transition_to_open(&self) {
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        *self.opened_at.lock() = Some(Instant::now());

        let mut window = self.window.lock();
        let rate = window.failure_rate();
        let calls = window.outcomes.len();
        window.half_open_attempts = 0;
        drop(window);

        error!(
            operation = %self.name,
            failure_rate = rate,
            recorded_calls = calls,
            open_duration_ms = self.config.open_duration.as_millis() as u64,
            "Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_half_open(&self) {
        self.state
            .store(CircuitState::HalfOpen as u8, Ordering::Release);
        self.window.lock().reset();

        info!(
            operation = %self.name,
            half_open_permits = self.config.half_open_permits,
            "Circuit breaker half-open (testing recovery)"
        );
    }
}
