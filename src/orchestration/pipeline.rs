//! # Order Pipeline
//!
//! Drives one order through validate → process → transition → notify, with a
//! ceiling timeout bounding the entire multi-stage sequence (distinct from
//! the gateway's per-call timeouts). Every stage outcome is audited; any
//! error surfacing after the gateway's retries and breaker are exhausted, or
//! the ceiling elapsing, resolves to the ERROR status through the
//! compensating path. The pipeline never panics the batch: [`OrderPipeline::run`]
//! is infallible and reports through its outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::client::OrderProcessing;
use crate::config::ProcessingConfig;
use crate::error::{ProcessorError, Result};
use crate::models::{ActionOutcome, ActionType, NewOrderAction, Order};
use crate::state_machine::{OrderStatus, StatusTransitions};

const PROCESS_ERROR_CODE: &str = "ERR-001";

/// Terminal outcome of one pipeline run.
///
/// A validation rejection is a business outcome for the order but a
/// processed success for the batch; only `Failed` counts against the cycle.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// Remote processing succeeded and the order reached COMPLETED.
    Completed(Order),
    /// Business validation rejected the order; it reached VALIDATION_FAILED.
    ValidationFailed(Order),
    /// A stage failed unrecoverably or the ceiling timeout elapsed; the
    /// order was moved to ERROR.
    Failed { order_id: Uuid, reason: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Completed(order) | Self::ValidationFailed(order) => order.id,
            Self::Failed { order_id, .. } => *order_id,
        }
    }
}

/// Internal result of the staged sequence, before the compensating path has
/// had a chance to run. Failures surface as `Err` and never as a variant.
enum StageOutcome {
    Completed(Order),
    ValidationFailed(Order),
}

pub struct OrderPipeline {
    external: Arc<dyn OrderProcessing>,
    transitions: Arc<dyn StatusTransitions>,
    ceiling_timeout: Duration,
    actor: String,
}

impl OrderPipeline {
    pub fn new(
        external: Arc<dyn OrderProcessing>,
        transitions: Arc<dyn StatusTransitions>,
        config: &ProcessingConfig,
    ) -> Self {
        Self {
            external,
            transitions,
            ceiling_timeout: config.ceiling_timeout,
            actor: config.actor.clone(),
        }
    }

    /// Run the pipeline for one order within a batch cycle. Infallible: all
    /// errors resolve through the compensating ERROR path and are reported
    /// in the outcome.
    pub async fn run(&self, order: &Order) -> PipelineOutcome {
        let started = Instant::now();

        match timeout(self.ceiling_timeout, self.run_stages(order)).await {
            Ok(Ok(StageOutcome::Completed(updated))) => PipelineOutcome::Completed(updated),
            Ok(Ok(StageOutcome::ValidationFailed(updated))) => {
                PipelineOutcome::ValidationFailed(updated)
            }
            Ok(Err(err)) => self.fail(order, err.to_string(), started).await,
            Err(_) => {
                let reason = ProcessorError::PipelineTimeout(self.ceiling_timeout).to_string();
                self.fail(order, reason, started).await
            }
        }
    }

    /// Manual trigger: run the same pipeline outside a scheduled cycle and
    /// return the updated order. Used by the operator-facing action endpoint.
    pub async fn process_order(&self, order: &Order) -> Result<Order> {
        let started = Instant::now();

        match timeout(self.ceiling_timeout, self.run_stages(order)).await {
            Ok(Ok(StageOutcome::Completed(updated)))
            | Ok(Ok(StageOutcome::ValidationFailed(updated))) => Ok(updated),
            Ok(Err(err)) => {
                self.fail(order, err.to_string(), started).await;
                Err(err)
            }
            Err(_) => {
                let err = ProcessorError::PipelineTimeout(self.ceiling_timeout);
                self.fail(order, err.to_string(), started).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, order: &Order) -> Result<StageOutcome> {
        let started = Instant::now();

        self.transitions
            .record_action(NewOrderAction::new(
                order.id,
                ActionType::Process,
                ActionOutcome::Started,
                &self.actor,
                "Starting order processing",
            ))
            .await?;

        let valid = self.external.validate(order).await?;
        if !valid {
            warn!(order_id = %order.id, "order failed validation");
            let updated = self
                .transitions
                .transition(order.id, OrderStatus::ValidationFailed, &self.actor)
                .await?;
            self.transitions
                .record_action(
                    NewOrderAction::new(
                        order.id,
                        ActionType::Process,
                        ActionOutcome::Completed,
                        &self.actor,
                        "Order rejected by business validation",
                    )
                    .with_result(OrderStatus::ValidationFailed.to_string())
                    .with_duration(started.elapsed()),
                )
                .await?;
            return Ok(StageOutcome::ValidationFailed(updated));
        }

        debug!(order_id = %order.id, "order validated, processing");
        let in_progress = self
            .transitions
            .transition(order.id, OrderStatus::Processing, &self.actor)
            .await?;
        let processed = self.external.process(&in_progress).await?;

        let updated = self
            .transitions
            .transition(processed.id, OrderStatus::Completed, &self.actor)
            .await?;
        self.transitions
            .record_action(
                NewOrderAction::new(
                    order.id,
                    ActionType::Process,
                    ActionOutcome::Completed,
                    &self.actor,
                    "Order processing completed",
                )
                .with_result("SUCCESS")
                .with_duration(started.elapsed()),
            )
            .await?;

        // Notification is fire-and-forget relative to the order's own
        // lifecycle: a failure here never reverts COMPLETED.
        match self.external.notify(&updated).await {
            Ok(notification_id) => {
                debug!(
                    order_id = %updated.id,
                    notification_id = %notification_id,
                    "completion notification sent"
                );
            }
            Err(err) => {
                warn!(
                    order_id = %updated.id,
                    error = %err,
                    "completion notification failed; order remains COMPLETED"
                );
                let audit = self
                    .transitions
                    .record_action(
                        NewOrderAction::new(
                            updated.id,
                            ActionType::Notify,
                            ActionOutcome::Failed,
                            &self.actor,
                            "Completion notification failed",
                        )
                        .with_error(PROCESS_ERROR_CODE, err.to_string()),
                    )
                    .await;
                if let Err(audit_err) = audit {
                    error!(
                        order_id = %updated.id,
                        error = %audit_err,
                        "failed to audit notification failure"
                    );
                }
            }
        }

        info!(order_id = %updated.id, "order completed");
        Ok(StageOutcome::Completed(updated))
    }

    /// Compensating error path: audit the failure and move the order to
    /// ERROR. Runs outside the ceiling timeout so a timed-out order still
    /// gets its terminal transition.
    async fn fail(&self, order: &Order, reason: String, started: Instant) -> PipelineOutcome {
        error!(order_id = %order.id, error = %reason, "order pipeline failed");

        let audit = self
            .transitions
            .record_action(
                NewOrderAction::new(
                    order.id,
                    ActionType::Process,
                    ActionOutcome::Failed,
                    &self.actor,
                    "Order processing failed",
                )
                .with_error(PROCESS_ERROR_CODE, reason.clone())
                .with_duration(started.elapsed()),
            )
            .await;
        if let Err(err) = audit {
            error!(order_id = %order.id, error = %err, "failed to audit pipeline failure");
        }

        if let Err(err) = self
            .transitions
            .transition(order.id, OrderStatus::Error, &self.actor)
            .await
        {
            error!(
                order_id = %order.id,
                error = %err,
                "failed to mark order as ERROR"
            );
        }

        PipelineOutcome::Failed {
            order_id: order.id,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{test_order, InMemoryTransitions, ScriptedExternalService};

    fn pipeline_with(
        external: Arc<ScriptedExternalService>,
        transitions: Arc<InMemoryTransitions>,
        ceiling: Duration,
    ) -> OrderPipeline {
        let config = ProcessingConfig {
            ceiling_timeout: ceiling,
            ..ProcessingConfig::default()
        };
        OrderPipeline::new(external, transitions, &config)
    }

    #[tokio::test]
    async fn successful_order_reaches_completed_with_one_completed_audit() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let outcome = pipeline.run(&order).await;

        assert!(matches!(outcome, PipelineOutcome::Completed(_)));
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::Completed)
        );
        assert_eq!(external.notify_calls(), 1);

        let completed_process_actions = transitions
            .actions()
            .into_iter()
            .filter(|a| a.action_type == "PROCESS" && a.status == "COMPLETED")
            .count();
        assert_eq!(completed_process_actions, 1);
    }

    #[tokio::test]
    async fn validation_rejection_short_circuits() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        external.reject_validation(order.id);
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let outcome = pipeline.run(&order).await;

        assert!(matches!(outcome, PipelineOutcome::ValidationFailed(_)));
        assert!(outcome.is_success());
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::ValidationFailed)
        );
        assert_eq!(external.process_calls(), 0);
        assert_eq!(external.notify_calls(), 0);
    }

    #[tokio::test]
    async fn processing_failure_drives_error_status() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        external.fail_processing(order.id);
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let outcome = pipeline.run(&order).await;

        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::Error)
        );
        assert_eq!(external.notify_calls(), 0);

        let failed_actions = transitions
            .actions()
            .into_iter()
            .filter(|a| a.action_type == "PROCESS" && a.status == "FAILED")
            .count();
        assert_eq!(failed_actions, 1);
    }

    #[tokio::test]
    async fn notify_failure_does_not_revert_completed() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        external.fail_notification(order.id);
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let outcome = pipeline.run(&order).await;

        assert!(matches!(outcome, PipelineOutcome::Completed(_)));
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::Completed)
        );

        let notify_failures = transitions
            .actions()
            .into_iter()
            .filter(|a| a.action_type == "NOTIFY" && a.status == "FAILED")
            .count();
        assert_eq!(notify_failures, 1);
    }

    #[tokio::test]
    async fn ceiling_timeout_drives_error_status() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        external.set_process_delay(Duration::from_millis(200));
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_millis(50),
        );
        let outcome = pipeline.run(&order).await;

        assert!(matches!(outcome, PipelineOutcome::Failed { .. }));
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::Error)
        );
    }

    #[tokio::test]
    async fn manual_trigger_returns_updated_order() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let updated = pipeline.process_order(&order).await.unwrap();

        assert_eq!(updated.status, OrderStatus::Completed.to_string());
        assert!(updated.version > order.version);
    }

    #[tokio::test]
    async fn manual_trigger_surfaces_failures() {
        let order = test_order(OrderStatus::Pending);
        let external = Arc::new(ScriptedExternalService::default());
        external.fail_processing(order.id);
        let transitions = Arc::new(InMemoryTransitions::default());
        transitions.seed(order.clone());

        let pipeline = pipeline_with(
            external.clone(),
            transitions.clone(),
            Duration::from_secs(5),
        );
        let result = pipeline.process_order(&order).await;

        assert!(result.is_err());
        assert_eq!(
            transitions.current_status(order.id),
            Some(OrderStatus::Error)
        );
    }
}
