//! # Test Helpers
//!
//! Deterministic in-memory stand-ins for the persistence and gateway seams,
//! so pipeline and scheduler behavior can be exercised without a database or
//! network. Exported for use by the integration tests as well as the inline
//! unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::client::{ExternalServiceError, OrderProcessing};
use crate::error::{ProcessorError, Result};
use crate::models::{NewOrderAction, Order, OrderAction};
use crate::orchestration::OrderSelection;
use crate::state_machine::{OrderStatus, StatusTransitions};

/// A minimal valid order row in the given status.
pub fn test_order(status: OrderStatus) -> Order {
    Order {
        id: Uuid::new_v4(),
        reference_number: format!("ORD-{}", &Uuid::new_v4().simple().to_string()[..8]),
        order_type: "STANDARD".to_string(),
        status: status.to_string(),
        customer_id: Uuid::new_v4(),
        created_by: "test".to_string(),
        created_at: Utc::now(),
        updated_by: None,
        updated_at: None,
        priority: 5,
        due_date: None,
        description: None,
        metadata: None,
        version: 0,
        deleted: false,
    }
}

/// In-memory [`StatusTransitions`] with the same edge validation, version
/// bumping, and audit recording as the database-backed manager.
#[derive(Default)]
pub struct InMemoryTransitions {
    orders: Mutex<HashMap<Uuid, Order>>,
    actions: Mutex<Vec<OrderAction>>,
}

impl InMemoryTransitions {
    pub fn seed(&self, order: Order) {
        self.orders.lock().insert(order.id, order);
    }

    pub fn current_status(&self, order_id: Uuid) -> Option<OrderStatus> {
        self.orders
            .lock()
            .get(&order_id)
            .and_then(|order| order.status.parse().ok())
    }

    pub fn actions(&self) -> Vec<OrderAction> {
        self.actions.lock().clone()
    }

    fn apply(&self, order_id: Uuid, new_status: OrderStatus, actor: &str, validate_edge: bool) -> Result<Order> {
        let mut orders = self.orders.lock();
        let order = orders
            .get_mut(&order_id)
            .filter(|order| !order.deleted)
            .ok_or(ProcessorError::OrderNotFound(order_id))?;
        let current = order.parsed_status()?;

        let edge_allowed = if validate_edge {
            current.can_transition_to(new_status)
        } else {
            !current.is_terminal()
        };
        if !edge_allowed {
            let err = ProcessorError::InvalidTransition {
                from: current.to_string(),
                to: new_status.to_string(),
            };
            drop(orders);
            self.actions.lock().push(OrderAction {
                id: Uuid::new_v4(),
                order_id,
                action_type: "STATUS_CHANGE".to_string(),
                status: "FAILED".to_string(),
                performed_by: actor.to_string(),
                performed_at: Utc::now(),
                description: Some(format!("Status change {current} -> {new_status} failed")),
                result: None,
                error_code: Some("ERR-002".to_string()),
                error_message: Some(err.to_string()),
                duration_ms: None,
            });
            return Err(err);
        }

        order.status = new_status.to_string();
        order.version += 1;
        order.updated_by = Some(actor.to_string());
        order.updated_at = Some(Utc::now());
        let updated = order.clone();
        drop(orders);

        self.actions.lock().push(OrderAction {
            id: Uuid::new_v4(),
            order_id,
            action_type: "STATUS_CHANGE".to_string(),
            status: "COMPLETED".to_string(),
            performed_by: actor.to_string(),
            performed_at: Utc::now(),
            description: Some(format!("Status changed {current} -> {new_status}")),
            result: Some(new_status.to_string()),
            error_code: None,
            error_message: None,
            duration_ms: None,
        });

        Ok(updated)
    }
}

#[async_trait]
impl StatusTransitions for InMemoryTransitions {
    async fn transition(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order> {
        self.apply(order_id, new_status, actor, true)
    }

    async fn override_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        actor: &str,
    ) -> Result<Order> {
        self.apply(order_id, new_status, actor, false)
    }

    async fn record_action(&self, action: NewOrderAction) -> Result<OrderAction> {
        let materialized = OrderAction {
            id: Uuid::new_v4(),
            order_id: action.order_id,
            action_type: action.action_type.to_string(),
            status: action.status.to_string(),
            performed_by: action.performed_by,
            performed_at: Utc::now(),
            description: Some(action.description),
            result: action.result,
            error_code: action.error_code,
            error_message: action.error_message,
            duration_ms: action.duration_ms,
        };
        self.actions.lock().push(materialized.clone());
        Ok(materialized)
    }
}

/// Scripted [`OrderProcessing`] stub. Per-order failures are opted in; by
/// default every call succeeds. Tracks call counts and the peak number of
/// concurrently in-flight `process` calls.
#[derive(Default)]
pub struct ScriptedExternalService {
    rejected: Mutex<HashSet<Uuid>>,
    failing_process: Mutex<HashSet<Uuid>>,
    failing_notify: Mutex<HashSet<Uuid>>,
    process_delay: Mutex<Option<Duration>>,
    validate_calls: AtomicUsize,
    process_calls: AtomicUsize,
    notify_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedExternalService {
    pub fn reject_validation(&self, order_id: Uuid) {
        self.rejected.lock().insert(order_id);
    }

    pub fn fail_processing(&self, order_id: Uuid) {
        self.failing_process.lock().insert(order_id);
    }

    pub fn fail_notification(&self, order_id: Uuid) {
        self.failing_notify.lock().insert(order_id);
    }

    pub fn set_process_delay(&self, delay: Duration) {
        *self.process_delay.lock() = Some(delay);
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn process_calls(&self) -> usize {
        self.process_calls.load(Ordering::SeqCst)
    }

    pub fn notify_calls(&self) -> usize {
        self.notify_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl OrderProcessing for ScriptedExternalService {
    async fn validate(&self, order: &Order) -> std::result::Result<bool, ExternalServiceError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.rejected.lock().contains(&order.id))
    }

    async fn process(&self, order: &Order) -> std::result::Result<Order, ExternalServiceError> {
        self.process_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();

        let delay = *self.process_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.exit();

        if self.failing_process.lock().contains(&order.id) {
            return Err(ExternalServiceError::ServerError {
                operation: "external_service_process",
                status: 503,
            });
        }
        Ok(order.clone())
    }

    async fn notify(&self, order: &Order) -> std::result::Result<Uuid, ExternalServiceError> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_notify.lock().contains(&order.id) {
            return Err(ExternalServiceError::ServerError {
                operation: "external_service_notify",
                status: 502,
            });
        }
        Ok(Uuid::new_v4())
    }
}

/// Fixed-batch [`OrderSelection`] for scheduler tests.
pub struct StaticSelection {
    pending: Vec<Order>,
    due: Vec<Order>,
    failure: Option<String>,
}

impl StaticSelection {
    pub fn new(pending: Vec<Order>) -> Self {
        Self {
            pending,
            due: Vec::new(),
            failure: None,
        }
    }

    pub fn with_due(mut self, due: Vec<Order>) -> Self {
        self.due = due;
        self
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            pending: Vec::new(),
            due: Vec::new(),
            failure: Some(reason.to_string()),
        }
    }
}

#[async_trait]
impl OrderSelection for StaticSelection {
    async fn pending_batch(&self) -> Result<Vec<Order>> {
        match &self.failure {
            Some(reason) => Err(ProcessorError::Configuration(reason.clone())),
            None => Ok(self.pending.clone()),
        }
    }

    async fn due_batch(&self) -> Result<Vec<Order>> {
        match &self.failure {
            Some(reason) => Err(ProcessorError::Configuration(reason.clone())),
            None => Ok(self.due.clone()),
        }
    }
}
