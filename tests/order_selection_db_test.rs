//! Database-backed selection tests. These run only when `DATABASE_URL`
//! points at a disposable Postgres test database; without it each test is a
//! no-op so the default suite stays network- and database-free.

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use order_processor_core::orchestration::OrderSelection;
use order_processor_core::{BatchSelector, Order, OrderStatus, ProcessingConfig};

async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS orders (
            id UUID PRIMARY KEY,
            reference_number TEXT NOT NULL,
            type TEXT NOT NULL,
            status TEXT NOT NULL,
            customer_id UUID NOT NULL,
            created_by TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_by TEXT,
            updated_at TIMESTAMPTZ,
            priority INT NOT NULL,
            due_date TIMESTAMPTZ,
            description TEXT,
            metadata JSONB,
            version BIGINT NOT NULL,
            deleted BOOLEAN NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .ok()?;

    // Drop leftovers from earlier runs. Rows inserted by this run are at
    // most two days old, so a three-day threshold never races a concurrent
    // test in this process.
    sqlx::query(
        "DELETE FROM orders \
         WHERE created_by = 'test' AND created_at < NOW() - INTERVAL '3 days'",
    )
    .execute(&pool)
    .await
    .ok()?;

    Some(pool)
}

async fn insert_order(
    pool: &PgPool,
    order_type: &str,
    status: OrderStatus,
    priority: i32,
    age: ChronoDuration,
    due_in: Option<ChronoDuration>,
    deleted: bool,
) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO orders \
         (id, reference_number, type, status, customer_id, created_by, created_at, \
          priority, due_date, description, metadata, version, deleted) \
         VALUES ($1, $2, $3, $4, $5, 'test', $6, $7, $8, NULL, NULL, 0, $9)",
    )
    .bind(id)
    .bind(format!("ORD-{id}"))
    .bind(order_type)
    .bind(status.to_string())
    .bind(Uuid::new_v4())
    .bind(Utc::now() - age)
    .bind(priority)
    .bind(due_in.map(|d| Utc::now() + d))
    .bind(deleted)
    .execute(pool)
    .await
    .unwrap();
    id
}

#[tokio::test]
async fn pending_batch_is_bounded_ordered_and_filtered() {
    let Some(pool) = test_pool().await else {
        return;
    };

    // Rows are isolated from other runs by a unique order type.
    let order_type = format!("TYPE-{}", Uuid::new_v4().simple());
    let day = ChronoDuration::days(2);

    let low_old = insert_order(&pool, &order_type, OrderStatus::Pending, 1, day, None, false).await;
    let high = insert_order(&pool, &order_type, OrderStatus::Pending, 9, day, None, false).await;
    let mid_older = insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        5,
        day + ChronoDuration::hours(1),
        None,
        false,
    )
    .await;
    let mid_newer =
        insert_order(&pool, &order_type, OrderStatus::Pending, 5, day, None, false).await;

    // Excluded: soft-deleted, wrong status, too recent.
    insert_order(&pool, &order_type, OrderStatus::Pending, 9, day, None, true).await;
    insert_order(&pool, &order_type, OrderStatus::Completed, 9, day, None, false).await;
    insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        9,
        ChronoDuration::minutes(1),
        None,
        false,
    )
    .await;

    let config = ProcessingConfig {
        batch_size: 3,
        order_types: vec![order_type],
        max_age: Duration::from_secs(60 * 60), // one hour
        ..ProcessingConfig::default()
    };
    let selector = BatchSelector::new(pool, config);

    let batch = selector.pending_batch().await.unwrap();
    let ids: Vec<Uuid> = batch.iter().map(|o| o.id).collect();

    // At most batch_size rows; priority DESC, then created_at ASC; the
    // lowest-priority row falls off the end of the bounded batch.
    assert_eq!(ids, vec![high, mid_older, mid_newer]);
    assert!(!ids.contains(&low_old));
    assert!(batch.iter().all(|o| !o.deleted));
}

#[tokio::test]
async fn due_batch_only_selects_arrived_due_dates() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let order_type = format!("TYPE-{}", Uuid::new_v4().simple());
    let day = ChronoDuration::days(2);

    let overdue = insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        5,
        day,
        Some(ChronoDuration::hours(-1)),
        false,
    )
    .await;
    let not_yet_due = insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        5,
        day,
        Some(ChronoDuration::hours(1)),
        false,
    )
    .await;
    let overdue_deleted = insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        5,
        day,
        Some(ChronoDuration::hours(-1)),
        true,
    )
    .await;

    let selector = BatchSelector::new(pool, ProcessingConfig::default());
    let batch = selector.due_batch().await.unwrap();
    let ids: Vec<Uuid> = batch.iter().map(|o| o.id).collect();

    assert!(ids.contains(&overdue));
    assert!(!ids.contains(&not_yet_due));
    assert!(!ids.contains(&overdue_deleted));
}

#[tokio::test]
async fn stale_version_update_is_distinguishable_from_missing_row() {
    let Some(pool) = test_pool().await else {
        return;
    };

    let order_type = format!("TYPE-{}", Uuid::new_v4().simple());
    let id = insert_order(
        &pool,
        &order_type,
        OrderStatus::Pending,
        5,
        ChronoDuration::days(1),
        None,
        false,
    )
    .await;

    // Stale expected version: the row exists, so this is a conflict.
    let stale = Order::update_status(&pool, id, OrderStatus::Processing, "test", 99).await;
    assert!(matches!(
        stale,
        Err(order_processor_core::ProcessorError::VersionConflict { expected: 99, .. })
    ));

    // Missing row: not found, not a conflict.
    let missing =
        Order::update_status(&pool, Uuid::new_v4(), OrderStatus::Processing, "test", 0).await;
    assert!(matches!(
        missing,
        Err(order_processor_core::ProcessorError::OrderNotFound(_))
    ));

    // The correct version succeeds and increments.
    let updated = Order::update_status(&pool, id, OrderStatus::Processing, "test", 0)
        .await
        .unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.status, "PROCESSING");
}
