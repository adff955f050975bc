//! # Resilience Module
//!
//! Retry and circuit-breaker policies protecting calls to the external order
//! service. Policy runtime state (sliding-window failure counters, breaker
//! state) is process-local and keyed by logical operation name through the
//! [`PolicyRegistry`]; nothing here is persisted, so a restart resets all
//! breakers to closed.
//!
//! The gateway composes the policies in a fixed order, innermost to
//! outermost: per-call timeout, then retry, then circuit breaker. A breaker
//! that is open therefore rejects the call before any retry attempt is made.

pub mod circuit_breaker;
pub mod registry;
pub mod retry;

use std::time::Duration;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerError, CircuitState};
pub use registry::PolicyRegistry;
pub use retry::{RetryPolicy, Transient};

/// Circuit breaker thresholds for one logical operation.
///
/// The breaker opens when, out of the last `sliding_window_size` calls and
/// after at least `minimum_calls` have been observed, the failure rate
/// reaches `failure_rate_threshold` percent. It stays open for
/// `open_duration`, then admits up to `half_open_permits` trial calls.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_rate_threshold: f64,
    pub sliding_window_size: usize,
    pub minimum_calls: usize,
    pub open_duration: Duration,
    pub half_open_permits: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            sliding_window_size: 10,
            minimum_calls: 5,
            open_duration: Duration::from_secs(10),
            half_open_permits: 5,
        }
    }
}

/// Retry policy parameters: a fixed attempt budget with a fixed inter-attempt
/// delay. Only transient failures are retried.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub wait: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wait: Duration::from_millis(500),
        }
    }
}
