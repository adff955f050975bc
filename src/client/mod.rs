//! Outbound gateway to the external order service.

pub mod external_service;

pub use external_service::{
    ExternalServiceClient, ExternalServiceError, OrderProcessing, OP_NOTIFY, OP_PROCESS,
    OP_VALIDATE,
};
