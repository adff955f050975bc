//! # Order Processor Scheduler
//!
//! Owns the two periodic cycles: an age-based cycle over typed PENDING
//! orders and a due-date cycle over orders whose due date has arrived. Each
//! cycle type carries its own re-entrancy guard so a slow batch is never
//! overlapped by the next tick of the same cycle; the tick is skipped and
//! logged instead. The two cycle types are independent and may run
//! concurrently with each other. Any error inside a cycle is contained to
//! that cycle.

use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::config::ProcessingConfig;
use crate::logging::{log_cycle_summary, log_error};
use crate::orchestration::executor::{BatchExecutor, BatchStats};
use crate::orchestration::selector::OrderSelection;

const CYCLE_PENDING: &str = "pending";
const CYCLE_DUE: &str = "due";

/// What happened on one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Processing is disabled by configuration.
    Disabled,
    /// The previous run of this cycle type is still in flight; skipped.
    AlreadyRunning,
    /// Batch selection failed; nothing was executed.
    SelectionFailed(String),
    /// The batch ran to completion (possibly empty).
    Completed(BatchStats),
}

pub struct OrderProcessorScheduler {
    selector: Arc<dyn OrderSelection>,
    executor: Arc<BatchExecutor>,
    config: ProcessingConfig,
    pending_guard: Semaphore,
    due_guard: Semaphore,
}

impl OrderProcessorScheduler {
    pub fn new(
        selector: Arc<dyn OrderSelection>,
        executor: Arc<BatchExecutor>,
        config: ProcessingConfig,
    ) -> Self {
        Self {
            selector,
            executor,
            config,
            pending_guard: Semaphore::new(1),
            due_guard: Semaphore::new(1),
        }
    }

    /// One tick of the age-based cycle.
    pub async fn run_processing_cycle(&self) -> CycleOutcome {
        self.run_cycle(CYCLE_PENDING, &self.pending_guard).await
    }

    /// One tick of the due-date cycle.
    pub async fn run_due_cycle(&self) -> CycleOutcome {
        self.run_cycle(CYCLE_DUE, &self.due_guard).await
    }

    async fn run_cycle(&self, cycle: &str, guard: &Semaphore) -> CycleOutcome {
        if !self.config.enabled {
            return CycleOutcome::Disabled;
        }

        let _permit = match guard.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(cycle = %cycle, "previous cycle still running, skipping tick");
                return CycleOutcome::AlreadyRunning;
            }
        };

        let batch = match self.select(cycle).await {
            Ok(batch) => batch,
            Err(err) => {
                log_error("scheduler", "batch_selection", &err.to_string(), Some(cycle));
                return CycleOutcome::SelectionFailed(err.to_string());
            }
        };

        if batch.is_empty() {
            info!(cycle = %cycle, "no eligible orders");
            return CycleOutcome::Completed(BatchStats::default());
        }

        info!(cycle = %cycle, selected = batch.len(), "starting batch");
        let stats = self.executor.execute(batch).await;
        log_cycle_summary(cycle, stats.selected, stats.succeeded, stats.failed);
        CycleOutcome::Completed(stats)
    }

    async fn select(&self, cycle: &str) -> crate::error::Result<Vec<crate::models::Order>> {
        match cycle {
            CYCLE_DUE => self.selector.due_batch().await,
            _ => self.selector.pending_batch().await,
        }
    }

    /// Spawn both periodic cycles. Handles run until aborted; ticks missed
    /// while a batch is in flight are delayed, not bunched.
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(2);

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.run_processing_cycle().await;
            }
        }));

        let scheduler = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            let mut ticker = interval(scheduler.config.due_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                scheduler.run_due_cycle().await;
            }
        }));

        info!(
            interval = ?self.config.interval,
            due_interval = ?self.config.due_interval,
            "order processor scheduler started"
        );
        handles
    }
}
