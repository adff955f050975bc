//! # External Service Gateway
//!
//! Wraps the three remote operations of the order collaborator service
//! (validate, process, notify) behind one call contract. Each call is
//! composed, innermost to outermost, of a per-call timeout, the retry
//! policy, and the circuit breaker registered for that operation name.
//!
//! A breaker that is open rejects the call before the retry policy runs, so
//! breaker-open rejections are never themselves retried or recorded as new
//! failures. A `validate` response of `false` is a business outcome, not an
//! error: it does not trip the breaker and is not retried.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ExternalServiceConfig;
use crate::logging::log_external_call;
use crate::models::Order;
use crate::resilience::{CircuitBreakerError, PolicyRegistry, Transient};

pub const OP_VALIDATE: &str = "external_service_validate";
pub const OP_PROCESS: &str = "external_service_process";
pub const OP_NOTIFY: &str = "external_service_notify";

/// Failure taxonomy for remote calls. `Transport`, `ServerError`, and
/// `Timeout` are transient and eligible for retry; `ClientError` and
/// `InvalidResponse` are not. `CircuitOpen` is a fail-fast rejection that
/// never reached the network.
#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("{operation}: transport error: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation}: remote returned server error {status}")]
    ServerError {
        operation: &'static str,
        status: u16,
    },

    #[error("{operation}: remote returned client error {status}")]
    ClientError {
        operation: &'static str,
        status: u16,
    },

    #[error("{operation}: call timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("circuit breaker open for {operation}")]
    CircuitOpen { operation: String },

    #[error("{operation}: invalid response body: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl Transient for ExternalServiceError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::ServerError { .. } | Self::Timeout { .. }
        )
    }
}

/// The gateway seam used by the order pipeline. The production
/// implementation is [`ExternalServiceClient`]; tests substitute scripted
/// in-memory services.
#[async_trait]
pub trait OrderProcessing: Send + Sync {
    /// Business validation. `Ok(false)` is a rejection, not a failure.
    async fn validate(&self, order: &Order) -> Result<bool, ExternalServiceError>;

    /// Remote processing; returns the order as transformed by the remote.
    async fn process(&self, order: &Order) -> Result<Order, ExternalServiceError>;

    /// Completion notification; returns the remote notification id.
    async fn notify(&self, order: &Order) -> Result<Uuid, ExternalServiceError>;
}

#[derive(Debug, Deserialize)]
struct ValidationResponse {
    valid: bool,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationResponse {
    notification_id: Uuid,
    #[allow(dead_code)]
    status: Option<String>,
    message: Option<String>,
}

pub struct ExternalServiceClient {
    http: reqwest::Client,
    base_url: String,
    call_timeout: Duration,
    policies: Arc<PolicyRegistry>,
}

impl ExternalServiceClient {
    pub fn new(
        config: ExternalServiceConfig,
        policies: Arc<PolicyRegistry>,
    ) -> Result<Self, crate::error::ProcessorError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| crate::error::ProcessorError::Configuration(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            call_timeout: config.call_timeout,
            policies,
        })
    }

    /// One POST with the per-call timeout applied. Innermost layer of the
    /// resilience stack.
    async fn post_json<B, R>(
        &self,
        operation: &'static str,
        path: &str,
        body: &B,
    ) -> Result<R, ExternalServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let request = async {
            let response = self
                .http
                .post(&url)
                .json(body)
                .send()
                .await
                .map_err(|source| ExternalServiceError::Transport { operation, source })?;

            let status = response.status();
            if status.is_server_error() {
                return Err(ExternalServiceError::ServerError {
                    operation,
                    status: status.as_u16(),
                });
            }
            if status.is_client_error() {
                return Err(ExternalServiceError::ClientError {
                    operation,
                    status: status.as_u16(),
                });
            }

            response
                .json::<R>()
                .await
                .map_err(|e| ExternalServiceError::InvalidResponse {
                    operation,
                    reason: e.to_string(),
                })
        };

        match tokio::time::timeout(self.call_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(ExternalServiceError::Timeout {
                operation,
                timeout: self.call_timeout,
            }),
        }
    }

    /// Apply the full resilience stack around one remote operation:
    /// timeout (inside `call`), then retry, then circuit breaker.
    async fn guarded<R, F, Fut>(
        &self,
        operation: &'static str,
        order_id: Uuid,
        call: F,
    ) -> Result<R, ExternalServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R, ExternalServiceError>>,
    {
        let breaker = self.policies.circuit_breaker(operation);
        let retry = self.policies.retry_policy();
        let started = std::time::Instant::now();

        let result = match breaker.call(|| retry.execute(operation, call)).await {
            Ok(value) => Ok(value),
            Err(CircuitBreakerError::CircuitOpen { operation }) => {
                Err(ExternalServiceError::CircuitOpen { operation })
            }
            Err(CircuitBreakerError::OperationFailed(error)) => Err(error),
        };

        log_external_call(
            operation,
            Some(order_id),
            if result.is_ok() { "SUCCESS" } else { "FAILED" },
            Some(started.elapsed().as_millis() as u64),
            None,
        );
        result
    }
}

#[async_trait]
impl OrderProcessing for ExternalServiceClient {
    async fn validate(&self, order: &Order) -> Result<bool, ExternalServiceError> {
        debug!(order_id = %order.id, "validating order");

        let response: ValidationResponse = self
            .guarded(OP_VALIDATE, order.id, || {
                self.post_json(OP_VALIDATE, "/api/orders/validate", order)
            })
            .await?;

        if !response.valid {
            warn!(
                order_id = %order.id,
                message = response.message.as_deref().unwrap_or(""),
                "order failed remote validation"
            );
        }
        Ok(response.valid)
    }

    async fn process(&self, order: &Order) -> Result<Order, ExternalServiceError> {
        debug!(order_id = %order.id, "sending order for processing");

        let processed: Order = self
            .guarded(OP_PROCESS, order.id, || {
                self.post_json(OP_PROCESS, "/api/orders/process", order)
            })
            .await?;

        debug!(order_id = %processed.id, "order processed by remote");
        Ok(processed)
    }

    async fn notify(&self, order: &Order) -> Result<Uuid, ExternalServiceError> {
        debug!(order_id = %order.id, "sending completion notification");

        let response: NotificationResponse = self
            .guarded(OP_NOTIFY, order.id, || {
                self.post_json(OP_NOTIFY, "/api/orders/notify", order)
            })
            .await?;

        debug!(
            order_id = %order.id,
            notification_id = %response.notification_id,
            message = response.message.as_deref().unwrap_or(""),
            "notification sent"
        );
        Ok(response.notification_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RetryConfig};
    use crate::state_machine::OrderStatus;
    use crate::test_helpers::test_order;

    fn client_for(server_url: &str, policies: Arc<PolicyRegistry>) -> ExternalServiceClient {
        ExternalServiceClient::new(
            ExternalServiceConfig {
                base_url: server_url.to_string(),
                call_timeout: Duration::from_secs(2),
            },
            policies,
        )
        .unwrap()
    }

    fn fast_policies() -> Arc<PolicyRegistry> {
        Arc::new(PolicyRegistry::new(
            CircuitBreakerConfig {
                failure_rate_threshold: 50.0,
                sliding_window_size: 4,
                minimum_calls: 2,
                open_duration: Duration::from_secs(30),
                half_open_permits: 1,
            },
            RetryConfig {
                max_attempts: 3,
                wait: Duration::from_millis(1),
            },
        ))
    }

    #[tokio::test]
    async fn validate_returns_business_outcome() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/orders/validate")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"valid": false, "message": "missing customer"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url(), fast_policies());
        let order = test_order(OrderStatus::Pending);

        let valid = client.validate(&order).await.unwrap();
        assert!(!valid);
        // A business rejection is a successful call: one request, no retries.
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/orders/process")
            .with_status(400)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server.url(), fast_policies());
        let order = test_order(OrderStatus::Pending);

        let result = client.process(&order).await;
        assert!(matches!(
            result,
            Err(ExternalServiceError::ClientError { status: 400, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn exhausted_retries_surface_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/orders/process")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server.url(), fast_policies());
        let order = test_order(OrderStatus::Pending);

        let result = client.process(&order).await;
        assert!(matches!(
            result,
            Err(ExternalServiceError::ServerError { status: 500, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn open_breaker_fails_fast_without_network_calls() {
        let mut server = mockito::Server::new_async().await;
        // Two retried call sequences of 3 attempts each open the breaker.
        let mock = server
            .mock("POST", "/api/orders/notify")
            .with_status(502)
            .expect(6)
            .create_async()
            .await;

        let policies = fast_policies();
        let client = client_for(&server.url(), policies.clone());
        let order = test_order(OrderStatus::Completed);

        for _ in 0..2 {
            let result = client.notify(&order).await;
            assert!(matches!(
                result,
                Err(ExternalServiceError::ServerError { .. })
            ));
        }
        assert_eq!(
            policies.circuit_breaker(OP_NOTIFY).state(),
            CircuitState::Open
        );

        // Breaker is open: rejected immediately, no further requests.
        let result = client.notify(&order).await;
        assert!(matches!(
            result,
            Err(ExternalServiceError::CircuitOpen { .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn process_decodes_remote_order() {
        let mut server = mockito::Server::new_async().await;
        let mut order = test_order(OrderStatus::Pending);
        order.description = Some("echoed back".to_string());
        let body = serde_json::to_string(&order).unwrap();

        server
            .mock("POST", "/api/orders/process")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = client_for(&server.url(), fast_policies());
        let processed = client.process(&order).await.unwrap();
        assert_eq!(processed, order);
    }

    #[tokio::test]
    async fn notify_extracts_notification_id() {
        let mut server = mockito::Server::new_async().await;
        let notification_id = Uuid::new_v4();
        server
            .mock("POST", "/api/orders/notify")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(format!(
                r#"{{"notificationId": "{notification_id}", "status": "SENT", "message": null}}"#
            ))
            .create_async()
            .await;

        let client = client_for(&server.url(), fast_policies());
        let order = test_order(OrderStatus::Completed);

        let id = client.notify(&order).await.unwrap();
        assert_eq!(id, notification_id);
    }
}
