use std::str::FromStr;
use std::time::Duration;

use crate::error::{ProcessorError, Result};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Top-level configuration for the order-processing core.
///
/// Defaults match the deployed service configuration; `from_env()` overrides
/// individual settings from `ORDER_*` environment variables.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub database_url: String,
    pub external: ExternalServiceConfig,
    pub processing: ProcessingConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Remote collaborator endpoint settings.
#[derive(Debug, Clone)]
pub struct ExternalServiceConfig {
    pub base_url: String,
    /// Per-call timeout inside the gateway, distinct from the per-order
    /// ceiling timeout.
    pub call_timeout: Duration,
}

impl Default for ExternalServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            call_timeout: Duration::from_secs(30),
        }
    }
}

/// Batch selection and scheduling settings.
#[derive(Debug, Clone)]
pub struct ProcessingConfig {
    /// Runtime toggle; a disabled scheduler skips every tick.
    pub enabled: bool,
    /// Maximum orders selected per cycle.
    pub batch_size: i64,
    /// Maximum in-flight pipelines per cycle.
    pub concurrency: usize,
    /// Admissible order types for the age-based cycle.
    pub order_types: Vec<String>,
    /// Interval of the age-based cycle.
    pub interval: Duration,
    /// Interval of the due-date cycle.
    pub due_interval: Duration,
    /// Only orders created at least this long ago are selected.
    pub max_age: Duration,
    /// Ceiling timeout across one order's entire pipeline.
    pub ceiling_timeout: Duration,
    /// Actor recorded on automated transitions and audit entries.
    pub actor: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            batch_size: 100,
            concurrency: 10,
            order_types: vec!["STANDARD".to_string(), "PRIORITY".to_string()],
            interval: Duration::from_secs(60),
            due_interval: Duration::from_secs(300),
            max_age: Duration::from_secs(24 * 60 * 60),
            ceiling_timeout: Duration::from_secs(30),
            actor: "system".to_string(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost/orders_development".to_string(),
            external: ExternalServiceConfig::default(),
            processing: ProcessingConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }
        if let Ok(url) = std::env::var("ORDER_SERVICE_URL") {
            config.external.base_url = url;
        }
        if let Some(timeout_ms) = parse_env::<u64>("ORDER_SERVICE_TIMEOUT_MS")? {
            config.external.call_timeout = Duration::from_millis(timeout_ms);
        }

        if let Some(enabled) = parse_env::<bool>("ORDER_PROCESSING_ENABLED")? {
            config.processing.enabled = enabled;
        }
        if let Some(batch_size) = parse_env::<i64>("ORDER_PROCESSING_BATCH_SIZE")? {
            config.processing.batch_size = batch_size;
        }
        if let Some(concurrency) = parse_env::<usize>("ORDER_PROCESSING_CONCURRENCY")? {
            config.processing.concurrency = concurrency;
        }
        if let Ok(types) = std::env::var("ORDER_PROCESSING_TYPES") {
            config.processing.order_types = types
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
        }
        if let Some(interval_ms) = parse_env::<u64>("ORDER_PROCESSING_INTERVAL_MS")? {
            config.processing.interval = Duration::from_millis(interval_ms);
        }
        if let Some(due_ms) = parse_env::<u64>("ORDER_PROCESSING_DUE_INTERVAL_MS")? {
            config.processing.due_interval = Duration::from_millis(due_ms);
        }
        if let Some(max_age_s) = parse_env::<u64>("ORDER_PROCESSING_MAX_AGE_SECS")? {
            config.processing.max_age = Duration::from_secs(max_age_s);
        }
        if let Some(ceiling_ms) = parse_env::<u64>("ORDER_PROCESSING_CEILING_TIMEOUT_MS")? {
            config.processing.ceiling_timeout = Duration::from_millis(ceiling_ms);
        }

        if let Some(max_attempts) = parse_env::<u32>("ORDER_RETRY_MAX_ATTEMPTS")? {
            config.retry.max_attempts = max_attempts;
        }
        if let Some(wait_ms) = parse_env::<u64>("ORDER_RETRY_WAIT_MS")? {
            config.retry.wait = Duration::from_millis(wait_ms);
        }

        if let Some(threshold) = parse_env::<f64>("ORDER_BREAKER_FAILURE_RATE")? {
            config.circuit_breaker.failure_rate_threshold = threshold;
        }
        if let Some(window) = parse_env::<usize>("ORDER_BREAKER_WINDOW_SIZE")? {
            config.circuit_breaker.sliding_window_size = window;
        }
        if let Some(minimum) = parse_env::<usize>("ORDER_BREAKER_MINIMUM_CALLS")? {
            config.circuit_breaker.minimum_calls = minimum;
        }
        if let Some(open_ms) = parse_env::<u64>("ORDER_BREAKER_OPEN_DURATION_MS")? {
            config.circuit_breaker.open_duration = Duration::from_millis(open_ms);
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ProcessorError::Configuration(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployed_configuration() {
        let config = ProcessorConfig::default();

        assert!(config.processing.enabled);
        assert_eq!(config.processing.batch_size, 100);
        assert_eq!(config.processing.concurrency, 10);
        assert_eq!(config.processing.order_types, vec!["STANDARD", "PRIORITY"]);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.circuit_breaker.failure_rate_threshold, 50.0);
        assert_eq!(config.circuit_breaker.sliding_window_size, 10);
        assert_eq!(config.circuit_breaker.minimum_calls, 5);
    }

    // Single test: env vars are process-global and tests run in parallel.
    #[test]
    fn env_overrides_are_applied_and_validated() {
        std::env::set_var("ORDER_PROCESSING_BATCH_SIZE", "25");
        std::env::set_var("ORDER_PROCESSING_TYPES", "URGENT, RETURN");

        let config = ProcessorConfig::from_env().unwrap();
        assert_eq!(config.processing.batch_size, 25);
        assert_eq!(config.processing.order_types, vec!["URGENT", "RETURN"]);

        std::env::set_var("ORDER_RETRY_MAX_ATTEMPTS", "not-a-number");
        let result = ProcessorConfig::from_env();
        assert!(matches!(result, Err(ProcessorError::Configuration(_))));

        std::env::remove_var("ORDER_PROCESSING_BATCH_SIZE");
        std::env::remove_var("ORDER_PROCESSING_TYPES");
        std::env::remove_var("ORDER_RETRY_MAX_ATTEMPTS");
    }
}
