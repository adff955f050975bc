//! Order lifecycle state management: the status graph and the single-writer
//! transition manager that persists status changes atomically with their
//! audit entries.

pub mod states;
pub mod transition;

pub use states::OrderStatus;
pub use transition::{OrderStore, PgOrderStore, StatusTransitionManager, StatusTransitions};
