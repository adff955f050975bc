#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Order Processor Core
//!
//! Asynchronous order-processing engine: periodic batch cycles select
//! eligible orders from PostgreSQL, drive each through an external
//! validate/process/notify collaborator behind retry and circuit-breaker
//! policies, and manage the order lifecycle with optimistically locked
//! status transitions and a full audit trail.
//!
//! ## Architecture
//!
//! - [`orchestration`] - Scheduler, batch selector, bounded executor, and
//!   the per-order pipeline
//! - [`state_machine`] - Order lifecycle states and the transition manager
//! - [`client`] - Gateway to the external order service
//! - [`resilience`] - Circuit breaker, retry policy, and the policy registry
//! - [`models`] - Order and audit-entry persistence
//! - [`config`] - Environment-driven configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use order_processor_core::{
//!     BatchExecutor, BatchSelector, ExternalServiceClient, OrderPipeline,
//!     OrderProcessorScheduler, PolicyRegistry, ProcessorConfig,
//!     StatusTransitionManager,
//! };
//! use sqlx::PgPool;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProcessorConfig::from_env()?;
//! let pool = PgPool::connect(&config.database_url).await?;
//!
//! let policies = Arc::new(PolicyRegistry::new(
//!     config.circuit_breaker.clone(),
//!     config.retry.clone(),
//! ));
//! let client = Arc::new(ExternalServiceClient::new(config.external.clone(), policies)?);
//! let transitions = Arc::new(StatusTransitionManager::new(pool.clone()));
//!
//! let pipeline = Arc::new(OrderPipeline::new(client, transitions, &config.processing));
//! let executor = Arc::new(BatchExecutor::new(pipeline, config.processing.concurrency));
//! let selector = Arc::new(BatchSelector::new(pool, config.processing.clone()));
//!
//! let scheduler = Arc::new(OrderProcessorScheduler::new(
//!     selector,
//!     executor,
//!     config.processing,
//! ));
//! let handles = scheduler.start();
//! # drop(handles);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod resilience;
pub mod state_machine;
pub mod test_helpers;

pub use client::{ExternalServiceClient, ExternalServiceError, OrderProcessing};
pub use config::{ExternalServiceConfig, ProcessingConfig, ProcessorConfig};
pub use error::{ProcessorError, Result};
pub use logging::init_structured_logging;
pub use models::{NewOrder, NewOrderAction, Order, OrderAction};
pub use orchestration::{
    BatchExecutor, BatchSelector, BatchStats, CycleOutcome, OrderPipeline,
    OrderProcessorScheduler, OrderSelection, PipelineOutcome,
};
pub use resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, PolicyRegistry,
    RetryConfig, RetryPolicy, Transient,
};
pub use state_machine::{OrderStatus, StatusTransitionManager, StatusTransitions};
