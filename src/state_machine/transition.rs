//! # Status Transition Manager
//!
//! The single writer of order status. Every transition loads the current
//! row, validates the lifecycle edge, applies a version-checked update, and
//! appends one audit entry per attempt, including failed attempts, so the
//! audit trail reconstructs the full processing history of an order.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Instant;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::{ProcessorError, Result};
use crate::logging::log_order_operation;
use crate::models::{ActionOutcome, ActionType, NewOrderAction, Order, OrderAction};
use crate::state_machine::OrderStatus;

/// Stale reads race with concurrent writers; one re-read is normally enough.
const VERSION_CONFLICT_RETRIES: u32 = 2;

pub(crate) const STATUS_ERROR_CODE: &str = "ERR-002";

/// Seam between the pipeline and order/audit persistence. The concrete
/// implementation is [`StatusTransitionManager`]; tests substitute an
/// in-memory one.
#[async_trait]
pub trait StatusTransitions: Send + Sync {
    /// Apply a validated lifecycle transition and return the updated order.
    async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order>;

    /// Operator override: move a non-terminal order to any status, audited.
    async fn override_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order>;

    /// Append an audit entry outside of a status transition (pipeline stage
    /// markers, notification failures).
    async fn record_action(&self, action: NewOrderAction) -> Result<OrderAction>;
}

/// Row-level persistence used by the transition manager. Factored out of the
/// manager so the version-conflict retry loop can be exercised against a
/// scripted store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: Uuid) -> Result<Option<Order>>;

    async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        expected_version: i64,
    ) -> Result<Order>;

    async fn append(&self, action: NewOrderAction) -> Result<OrderAction>;
}

/// The production store over the `orders` / `order_actions` tables.
pub struct PgOrderStore {
    pool: PgPool,
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn load(&self, order_id: Uuid) -> Result<Option<Order>> {
        Order::find_by_id(&self.pool, order_id).await
    }

    async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        expected_version: i64,
    ) -> Result<Order> {
        Order::update_status(&self.pool, order_id, new_status, actor, expected_version).await
    }

    async fn append(&self, action: NewOrderAction) -> Result<OrderAction> {
        OrderAction::create(&self.pool, action).await
    }
}

pub struct StatusTransitionManager<S: OrderStore = PgOrderStore> {
    store: S,
}

impl StatusTransitionManager {
    pub fn new(pool: PgPool) -> Self {
        Self {
            store: PgOrderStore { pool },
        }
    }
}

impl<S: OrderStore> StatusTransitionManager<S> {
    pub fn with_store(store: S) -> Self {
        Self { store }
    }

    async fn apply(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
        validate_edge: bool,
    ) -> Result<Order> {
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let order = self
                .store
                .load(order_id)
                .await?
                .filter(|order| !order.deleted)
                .ok_or(ProcessorError::OrderNotFound(order_id))?;
            let current = order.parsed_status()?;

            let edge_allowed = if validate_edge {
                current.can_transition_to(new_status)
            } else {
                // Operator overrides bypass the graph but never resurrect a
                // terminal order.
                !current.is_terminal()
            };
            if !edge_allowed {
                let err = ProcessorError::InvalidTransition {
                    from: current.to_string(),
                    to: new_status.to_string(),
                };
                self.append_audit(order_id, current, new_status, actor, Some(&err), started)
                    .await;
                return Err(err);
            }

            match self
                .store
                .update_status(order_id, new_status, actor, order.version)
                .await
            {
                Ok(updated) => {
                    self.append_audit(order_id, current, new_status, actor, None, started)
                        .await;
                    let details = format!("from {current} by {actor}");
                    log_order_operation(
                        "status_transition",
                        Some(order_id),
                        &new_status.to_string(),
                        Some(details.as_str()),
                    );
                    return Ok(updated);
                }
                Err(ProcessorError::VersionConflict { .. })
                    if attempts <= VERSION_CONFLICT_RETRIES =>
                {
                    debug!(
                        order_id = %order_id,
                        attempt = attempts,
                        "stale version on status update, retrying with fresh row"
                    );
                }
                Err(err) => {
                    self.append_audit(order_id, current, new_status, actor, Some(&err), started)
                        .await;
                    return Err(err);
                }
            }
        }
    }

    /// Append the audit entry paired with a transition attempt. An audit
    /// write failure is logged rather than masking the transition result.
    async fn append_audit(
        &self,
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
        actor: &str,
        failure: Option<&ProcessorError>,
        started: Instant,
    ) {
        let action = match failure {
            None => NewOrderAction::new(
                order_id,
                ActionType::StatusChange,
                ActionOutcome::Completed,
                actor,
                format!("Status changed {from} -> {to}"),
            )
            .with_result(to.to_string()),
            Some(err) => NewOrderAction::new(
                order_id,
                ActionType::StatusChange,
                ActionOutcome::Failed,
                actor,
                format!("Status change {from} -> {to} failed"),
            )
            .with_error(STATUS_ERROR_CODE, err.to_string()),
        }
        .with_duration(started.elapsed());

        if let Err(err) = self.store.append(action).await {
            error!(
                order_id = %order_id,
                error = %err,
                "failed to append status transition audit entry"
            );
        }
    }
}

#[async_trait]
impl<S: OrderStore> StatusTransitions for StatusTransitionManager<S> {
    async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order> {
        self.apply(order_id, new_status, actor, true).await
    }

    async fn override_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order> {
        self.apply(order_id, new_status, actor, false).await
    }

    async fn record_action(&self, action: NewOrderAction) -> Result<OrderAction> {
        self.store.append(action).await
    }
}
