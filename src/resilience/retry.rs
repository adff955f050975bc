//! Fixed-delay retry policy for transient remote failures.
//!
//! The policy retries only errors that classify themselves as transient via
//! the [`Transient`] trait; business outcomes and client-side errors surface
//! on the first attempt. When the attempt budget is exhausted the underlying
//! failure is returned unchanged.

use crate::resilience::RetryConfig;
use std::fmt::Display;
use std::future::Future;
use tokio::time::sleep;
use tracing::{info, warn};

/// Classification of failures eligible for retry.
pub trait Transient {
    /// True when the failure is expected to be short-lived (network I/O
    /// errors, remote 5xx responses, per-call timeouts).
    fn is_transient(&self) -> bool;
}

/// Retry executor with a fixed attempt budget and fixed inter-attempt delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Run `call` until it succeeds, fails non-transiently, or the attempt
    /// budget is exhausted.
    pub async fn execute<T, E, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            operation = %operation,
                            attempt = attempt,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(error) if error.is_transient() && attempt < self.config.max_attempts => {
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        max_attempts = self.config.max_attempts,
                        error = %error,
                        "transient failure, retrying"
                    );
                    sleep(self.config.wait).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }
}
