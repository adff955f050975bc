//! Per-operation resilience policy registry.
//!
//! Circuit breakers carry mutable runtime state and must be shared by every
//! pipeline calling the same logical operation, so they live in a concurrent
//! map keyed by operation name. The registry is an explicit object injected
//! into the gateway rather than process-global state, which keeps tests able
//! to use a fresh registry per case.

use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

pub struct PolicyRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
    retry_config: RetryConfig,
}

impl PolicyRegistry {
    pub fn new(breaker_config: CircuitBreakerConfig, retry_config: RetryConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            breaker_config,
            retry_config,
        }
    }

    /// Get or lazily create the circuit breaker for a logical operation.
    /// Every caller of the same operation name shares one breaker instance.
    pub fn circuit_breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(operation.to_string())
            .or_insert_with(|| {
                debug!(operation = %operation, "registering circuit breaker");
                Arc::new(CircuitBreaker::new(
                    operation.to_string(),
                    self.breaker_config.clone(),
                ))
            })
            .clone()
    }

    /// Retry policy applied to all operations. Stateless between calls, so a
    /// fresh instance per call site is fine.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_config.clone())
    }

    pub fn breaker_config(&self) -> &CircuitBreakerConfig {
        &self.breaker_config
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default(), RetryConfig::default())
    }
}
