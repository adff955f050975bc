//! # Batch Selector
//!
//! Computes the eligible-order set for a processing cycle. Eligibility is
//! recomputed from entity state on every cycle; there is no durable queue.
//! Queries are read-only, bounded by the configured batch size, and ordered
//! deterministically (priority descending, then creation time or due date
//! ascending) so cycles are reproducible in tests.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use tracing::debug;

use crate::config::ProcessingConfig;
use crate::error::Result;
use crate::models::Order;
use crate::state_machine::OrderStatus;

/// Seam between the scheduler and order selection. The concrete
/// implementation is [`BatchSelector`]; tests substitute static batches.
#[async_trait]
pub trait OrderSelection: Send + Sync {
    /// Eligible PENDING orders for the age-based cycle, filtered by the
    /// configured order types.
    async fn pending_batch(&self) -> Result<Vec<Order>>;

    /// Eligible PENDING orders whose due date has arrived.
    async fn due_batch(&self) -> Result<Vec<Order>>;
}

pub struct BatchSelector {
    pool: PgPool,
    config: ProcessingConfig,
}

impl BatchSelector {
    pub fn new(pool: PgPool, config: ProcessingConfig) -> Self {
        Self { pool, config }
    }
}

#[async_trait]
impl OrderSelection for BatchSelector {
    async fn pending_batch(&self) -> Result<Vec<Order>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.max_age)
                .unwrap_or_else(|_| chrono::Duration::hours(24));
        debug!(
            batch_size = self.config.batch_size,
            types = ?self.config.order_types,
            cutoff = %cutoff,
            "selecting pending orders"
        );

        Order::find_to_process_by_types(
            &self.pool,
            &[OrderStatus::Pending],
            cutoff,
            &self.config.order_types,
            self.config.batch_size,
        )
        .await
    }

    async fn due_batch(&self) -> Result<Vec<Order>> {
        let now = Utc::now();
        debug!(
            batch_size = self.config.batch_size,
            due_by = %now,
            "selecting due orders"
        );

        Order::find_due_for_processing(
            &self.pool,
            now,
            &[OrderStatus::Pending],
            self.config.batch_size,
        )
        .await
    }
}
