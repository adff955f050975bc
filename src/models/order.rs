//! # Order Model
//!
//! Row model for the `orders` table plus the persistence operations used by
//! the processing core: eligibility queries for batch selection and the
//! optimistic-version status update used by the transition manager.
//!
//! Orders are never physically deleted; `deleted = true` flags a row out of
//! every query in this module. The `version` counter increments on each
//! persisted mutation and a write against a stale version is rejected
//! distinguishably rather than silently overwriting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{ProcessorError, Result};
use crate::models::order_action::{ActionOutcome, ActionType, NewOrderAction, OrderAction};
use crate::state_machine::OrderStatus;

const ORDER_COLUMNS: &str = "id, reference_number, type, status, customer_id, created_by, \
     created_at, updated_by, updated_at, priority, due_date, description, metadata, version, deleted";

/// An order row. JSON form matches the collaborator API (camelCase, with the
/// order type exposed as `type`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub reference_number: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub order_type: String,
    pub status: String,
    pub customer_id: Uuid,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_by: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub priority: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub version: i64,
    pub deleted: bool,
}

/// New order for creation (without generated fields)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub reference_number: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub customer_id: Uuid,
    pub created_by: String,
    pub priority: i32,
    pub due_date: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl Order {
    /// Parsed lifecycle status of this row.
    pub fn parsed_status(&self) -> Result<OrderStatus> {
        self.status
            .parse()
            .map_err(|_| ProcessorError::InvalidTransition {
                from: self.status.clone(),
                to: "<unparsed>".to_string(),
            })
    }

    /// Create a new order in status PENDING, with a paired CREATE audit entry.
    pub async fn create(pool: &PgPool, new_order: NewOrder) -> Result<Order> {
        let sql = format!(
            "INSERT INTO orders \
             (id, reference_number, type, status, customer_id, created_by, created_at, \
              priority, due_date, description, metadata, version, deleted) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7, $8, $9, $10, 0, false) \
             RETURNING {ORDER_COLUMNS}"
        );
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new_order.reference_number)
            .bind(&new_order.order_type)
            .bind(OrderStatus::Pending.to_string())
            .bind(new_order.customer_id)
            .bind(&new_order.created_by)
            .bind(new_order.priority)
            .bind(new_order.due_date)
            .bind(&new_order.description)
            .bind(&new_order.metadata)
            .fetch_one(pool)
            .await?;

        OrderAction::create(
            pool,
            NewOrderAction::new(
                order.id,
                ActionType::Create,
                ActionOutcome::Completed,
                &order.created_by,
                "Order created",
            ),
        )
        .await?;

        Ok(order)
    }

    /// Find an order by ID, including soft-deleted rows. Callers that must
    /// exclude deleted orders check the flag themselves.
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let order = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(order)
    }

    /// Eligible orders by status and age: non-deleted rows in one of
    /// `statuses` created before `cutoff`, at most `limit` rows, ordered by
    /// priority descending then creation time ascending for determinism.
    pub async fn find_to_process(
        pool: &PgPool,
        statuses: &[OrderStatus],
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Order>> {
        let sql = to_process_sql();
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(status_strings(statuses))
            .bind(cutoff)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(orders)
    }

    /// Same as [`Order::find_to_process`] with an additional order-type filter.
    pub async fn find_to_process_by_types(
        pool: &PgPool,
        statuses: &[OrderStatus],
        cutoff: DateTime<Utc>,
        types: &[String],
        limit: i64,
    ) -> Result<Vec<Order>> {
        let sql = to_process_by_types_sql();
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(status_strings(statuses))
            .bind(cutoff)
            .bind(types)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(orders)
    }

    /// Eligible orders by due date: non-deleted rows in one of `statuses`
    /// due at or before `due_by`, ordered by priority descending then due
    /// date ascending.
    pub async fn find_due_for_processing(
        pool: &PgPool,
        due_by: DateTime<Utc>,
        statuses: &[OrderStatus],
        limit: i64,
    ) -> Result<Vec<Order>> {
        let sql = due_for_processing_sql();
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(due_by)
            .bind(status_strings(statuses))
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(orders)
    }

    pub async fn find_by_customer(pool: &PgPool, customer_id: Uuid) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE customer_id = $1 AND deleted = false \
             ORDER BY created_at DESC"
        );
        let orders = sqlx::query_as::<_, Order>(&sql)
            .bind(customer_id)
            .fetch_all(pool)
            .await?;
        Ok(orders)
    }

    pub async fn count_by_status(pool: &PgPool, status: OrderStatus) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM orders WHERE status = $1 AND deleted = false")
                .bind(status.to_string())
                .fetch_one(pool)
                .await?;
        Ok(count.0)
    }

    /// Atomically update status, actor, and timestamp while incrementing the
    /// version counter. The update only applies when the row still carries
    /// `expected_version`; a stale read yields [`ProcessorError::VersionConflict`],
    /// a missing or soft-deleted row yields [`ProcessorError::OrderNotFound`].
    pub async fn update_status(
        pool: &PgPool,
        id: Uuid,
        status: OrderStatus,
        actor: &str,
        expected_version: i64,
    ) -> Result<Order> {
        let sql = format!(
            "UPDATE orders \
             SET status = $2, updated_by = $3, updated_at = NOW(), version = version + 1 \
             WHERE id = $1 AND version = $4 AND deleted = false \
             RETURNING {ORDER_COLUMNS}"
        );
        let updated = sqlx::query_as::<_, Order>(&sql)
            .bind(id)
            .bind(status.to_string())
            .bind(actor)
            .bind(expected_version)
            .fetch_optional(pool)
            .await?;

        match updated {
            Some(order) => Ok(order),
            None => match Self::find_by_id(pool, id).await? {
                Some(existing) if !existing.deleted => Err(ProcessorError::VersionConflict {
                    id,
                    expected: expected_version,
                }),
                _ => Err(ProcessorError::OrderNotFound(id)),
            },
        }
    }

    /// Soft-delete an order, with a paired DELETE audit entry. Returns false
    /// when the row was already deleted or does not exist.
    pub async fn soft_delete(pool: &PgPool, id: Uuid, actor: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE orders \
             SET deleted = true, updated_by = $2, updated_at = NOW(), version = version + 1 \
             WHERE id = $1 AND deleted = false",
        )
        .bind(id)
        .bind(actor)
        .execute(pool)
        .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            OrderAction::create(
                pool,
                NewOrderAction::new(
                    id,
                    ActionType::Delete,
                    ActionOutcome::Completed,
                    actor,
                    "Order deleted",
                ),
            )
            .await?;
        }
        Ok(deleted)
    }
}

fn status_strings(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(ToString::to_string).collect()
}

// Eligibility queries, built as named strings so the selection contract
// (deterministic ordering, soft-delete exclusion, bounded result) is
// assertable in tests.

fn to_process_sql() -> String {
    format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE status = ANY($1) AND created_at < $2 AND deleted = false \
         ORDER BY priority DESC, created_at ASC \
         LIMIT $3"
    )
}

fn to_process_by_types_sql() -> String {
    format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE status = ANY($1) AND created_at < $2 AND type = ANY($3) AND deleted = false \
         ORDER BY priority DESC, created_at ASC \
         LIMIT $4"
    )
}

fn due_for_processing_sql() -> String {
    format!(
        "SELECT {ORDER_COLUMNS} FROM orders \
         WHERE due_date <= $1 AND status = ANY($2) AND deleted = false \
         ORDER BY priority DESC, due_date ASC \
         LIMIT $3"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_form_matches_collaborator_api() {
        let order = crate::test_helpers::test_order(OrderStatus::Pending);
        let json = serde_json::to_value(&order).unwrap();

        assert!(json.get("referenceNumber").is_some());
        assert!(json.get("type").is_some());
        assert!(json.get("customerId").is_some());
        assert!(json.get("order_type").is_none());

        let round_tripped: Order = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, order);
    }

    #[test]
    fn eligibility_queries_are_bounded_ordered_and_exclude_deleted() {
        for sql in [to_process_sql(), to_process_by_types_sql()] {
            assert!(sql.contains("deleted = false"));
            assert!(sql.contains("created_at < $2"));
            assert!(sql.contains("ORDER BY priority DESC, created_at ASC"));
            assert!(sql.contains("LIMIT $"));
        }
        assert!(to_process_by_types_sql().contains("type = ANY($3)"));

        let due = due_for_processing_sql();
        assert!(due.contains("deleted = false"));
        assert!(due.contains("due_date <= $1"));
        assert!(due.contains("ORDER BY priority DESC, due_date ASC"));
        assert!(due.contains("LIMIT $3"));
    }

    #[test]
    fn status_filters_use_wire_form() {
        assert_eq!(
            status_strings(&[OrderStatus::Pending, OrderStatus::Error]),
            vec!["PENDING", "ERROR"]
        );
    }

    #[test]
    fn parsed_status_rejects_unknown_values() {
        let mut order = crate::test_helpers::test_order(OrderStatus::Pending);
        assert_eq!(order.parsed_status().unwrap(), OrderStatus::Pending);

        order.status = "BOGUS".to_string();
        assert!(order.parsed_status().is_err());
    }
}
