//! # Order Action Model
//!
//! Append-only audit trail for order processing. One entry is written for
//! every attempted status transition and pipeline stage, including failures,
//! so the full history of an order's processing attempts can be
//! reconstructed even after the order reaches a terminal status. Rows are
//! never updated after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;

/// What kind of action was performed on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    Create,
    Process,
    Notify,
    StatusChange,
    Delete,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Process => write!(f, "PROCESS"),
            Self::Notify => write!(f, "NOTIFY"),
            Self::StatusChange => write!(f, "STATUS_CHANGE"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Outcome recorded for the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionOutcome {
    Started,
    Completed,
    Failed,
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// An immutable audit entry for one action attempt on an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderAction {
    pub id: Uuid,
    pub order_id: Uuid,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub action_type: String,
    pub status: String,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub description: Option<String>,
    pub result: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

/// New audit entry for creation (without generated fields)
#[derive(Debug, Clone)]
pub struct NewOrderAction {
    pub order_id: Uuid,
    pub action_type: ActionType,
    pub status: ActionOutcome,
    pub performed_by: String,
    pub description: String,
    pub result: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i64>,
}

impl NewOrderAction {
    pub fn new(
        order_id: Uuid,
        action_type: ActionType,
        status: ActionOutcome,
        performed_by: &str,
        description: impl Into<String>,
    ) -> Self {
        Self {
            order_id,
            action_type,
            status,
            performed_by: performed_by.to_string(),
            description: description.into(),
            result: None,
            error_code: None,
            error_message: None,
            duration_ms: None,
        }
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, code: &str, message: impl Into<String>) -> Self {
        self.error_code = Some(code.to_string());
        self.error_message = Some(message.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = Some(duration.as_millis() as i64);
        self
    }
}

impl OrderAction {
    /// Append an audit entry. The only write path for `order_actions`.
    pub async fn create(pool: &PgPool, new_action: NewOrderAction) -> Result<OrderAction> {
        let action = sqlx::query_as::<_, OrderAction>(
            "INSERT INTO order_actions \
             (id, order_id, type, status, performed_by, performed_at, description, \
              result, error_code, error_message, duration_ms) \
             VALUES ($1, $2, $3, $4, $5, NOW(), $6, $7, $8, $9, $10) \
             RETURNING id, order_id, type, status, performed_by, performed_at, description, \
                       result, error_code, error_message, duration_ms",
        )
        .bind(Uuid::new_v4())
        .bind(new_action.order_id)
        .bind(new_action.action_type.to_string())
        .bind(new_action.status.to_string())
        .bind(&new_action.performed_by)
        .bind(&new_action.description)
        .bind(&new_action.result)
        .bind(&new_action.error_code)
        .bind(&new_action.error_message)
        .bind(new_action.duration_ms)
        .fetch_one(pool)
        .await?;

        Ok(action)
    }

    /// Full audit history for one order, oldest first.
    pub async fn find_by_order(pool: &PgPool, order_id: Uuid) -> Result<Vec<OrderAction>> {
        let actions = sqlx::query_as::<_, OrderAction>(
            "SELECT id, order_id, type, status, performed_by, performed_at, description, \
                    result, error_code, error_message, duration_ms \
             FROM order_actions WHERE order_id = $1 \
             ORDER BY performed_at ASC",
        )
        .bind(order_id)
        .fetch_all(pool)
        .await?;
        Ok(actions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_populates_optional_fields() {
        let order_id = Uuid::new_v4();
        let action = NewOrderAction::new(
            order_id,
            ActionType::Process,
            ActionOutcome::Failed,
            "system",
            "Order processing failed",
        )
        .with_error("ERR-001", "remote returned server error 503")
        .with_duration(Duration::from_millis(42));

        assert_eq!(action.order_id, order_id);
        assert_eq!(action.action_type, ActionType::Process);
        assert_eq!(action.status, ActionOutcome::Failed);
        assert_eq!(action.error_code.as_deref(), Some("ERR-001"));
        assert_eq!(action.duration_ms, Some(42));
        assert!(action.result.is_none());
    }

    #[test]
    fn action_labels_use_wire_form() {
        assert_eq!(ActionType::StatusChange.to_string(), "STATUS_CHANGE");
        assert_eq!(ActionOutcome::Started.to_string(), "STARTED");
        assert_eq!(
            serde_json::to_string(&ActionType::Process).unwrap(),
            "\"PROCESS\""
        );
    }
}
