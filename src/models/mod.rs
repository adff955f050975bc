pub mod order;
pub mod order_action;

// Re-export core models for easy access
pub use order::{NewOrder, Order};
pub use order_action::{ActionOutcome, ActionType, NewOrderAction, OrderAction};
