//! # Orchestration
//!
//! The batch-processing engine: periodic scheduling, eligibility selection,
//! bounded fan-out, and the per-order pipeline.

pub mod executor;
pub mod pipeline;
pub mod scheduler;
pub mod selector;

pub use executor::{BatchExecutor, BatchStats};
pub use pipeline::{OrderPipeline, PipelineOutcome};
pub use scheduler::{CycleOutcome, OrderProcessorScheduler};
pub use selector::{BatchSelector, OrderSelection};
