//! # Batch Executor
//!
//! Fans a selected batch out across bounded concurrent pipeline runs. The
//! bound applies per batch: at most `concurrency` orders are in flight at
//! once, and the executor waits for every order before reporting. One
//! order's failure never aborts its siblings; failures are isolated into
//! the returned counters.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::models::Order;
use crate::orchestration::pipeline::{OrderPipeline, PipelineOutcome};

/// Aggregate counters for one executed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Orders handed to the executor.
    pub selected: usize,
    /// Pipelines that finished with a processed outcome (COMPLETED or
    /// VALIDATION_FAILED).
    pub succeeded: usize,
    /// Pipelines that resolved through the ERROR path, plus any task that
    /// panicked before reporting.
    pub failed: usize,
}

pub struct BatchExecutor {
    pipeline: Arc<OrderPipeline>,
    concurrency: usize,
}

impl BatchExecutor {
    pub fn new(pipeline: Arc<OrderPipeline>, concurrency: usize) -> Self {
        Self {
            pipeline,
            // A zero bound would deadlock the batch.
            concurrency: concurrency.max(1),
        }
    }

    /// Run the pipeline over every order in the batch, at most
    /// `concurrency` at a time, and aggregate the outcomes.
    pub async fn execute(&self, orders: Vec<Order>) -> BatchStats {
        let mut stats = BatchStats {
            selected: orders.len(),
            ..BatchStats::default()
        };
        if orders.is_empty() {
            return stats;
        }

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(orders.len());

        for order in orders {
            let permit_source = Arc::clone(&semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            handles.push(tokio::spawn(async move {
                // acquire() only fails if the semaphore is closed, which
                // cannot happen while we hold an Arc to it.
                let _permit = permit_source.acquire_owned().await;
                pipeline.run(&order).await
            }));
        }

        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => {
                    if outcome.is_success() {
                        stats.succeeded += 1;
                    } else {
                        stats.failed += 1;
                        if let PipelineOutcome::Failed { order_id, reason } = &outcome {
                            warn!(order_id = %order_id, reason = %reason, "order failed in batch");
                        }
                    }
                }
                Err(join_err) => {
                    stats.failed += 1;
                    error!(error = %join_err, "pipeline task aborted");
                }
            }
        }

        debug!(
            selected = stats.selected,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "batch executed"
        );
        stats
    }
}
