//! Structured error handling for the order-processing core.
//!
//! Every fallible operation in the crate resolves to [`ProcessorError`]. The
//! variants mirror the failure taxonomy of the pipeline: persistence errors,
//! missing or stale rows, invalid lifecycle transitions, external service
//! failures, and the per-order ceiling timeout.

use std::time::Duration;
use uuid::Uuid;

use crate::client::ExternalServiceError;

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The order does not exist or has been soft-deleted.
    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    /// An update targeted a stale optimistic-concurrency version. Retried
    /// with fresh data by the transition manager, never silently overwritten.
    #[error("stale version for order {id}: expected {expected}")]
    VersionConflict { id: Uuid, expected: i64 },

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error(transparent)]
    External(#[from] ExternalServiceError),

    /// The ceiling timeout over an entire per-order pipeline elapsed. This is
    /// distinct from the per-call timeout inside the gateway.
    #[error("order pipeline timed out after {0:?}")]
    PipelineTimeout(Duration),

    #[error("configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, ProcessorError>;
