use serde::{Deserialize, Serialize};
use std::fmt;

/// Order lifecycle states.
///
/// Orders are created PENDING by the order-creation collaborator and are
/// mutated exclusively by the transition manager afterwards. ERROR is not a
/// hard terminal state: a subsequent cycle or an operator reset may re-enter
/// it, but the batch selector only picks PENDING orders, which makes ERROR
/// effectively terminal unless reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Initial state, eligible for batch selection
    Pending,
    /// A pipeline is working on the order
    Processing,
    /// Remote processing succeeded
    Completed,
    /// Business validation rejected the order
    ValidationFailed,
    /// A stage failed after retries were exhausted, or the pipeline timed out
    Error,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::ValidationFailed)
    }

    /// Check if this is an error state that allows recovery
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    /// Check if the lifecycle graph permits moving to `target`.
    pub fn can_transition_to(&self, target: OrderStatus) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Completed)
                | (Self::Pending, Self::ValidationFailed)
                | (Self::Pending, Self::Error)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Error)
                | (Self::Error, Self::Pending)
                | (Self::Error, Self::Processing)
                | (Self::Error, Self::Error)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::ValidationFailed => write!(f, "VALIDATION_FAILED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "VALIDATION_FAILED" => Ok(Self::ValidationFailed),
            "ERROR" => Ok(Self::Error),
            _ => Err(format!("Invalid order status: {s}")),
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::ValidationFailed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(!OrderStatus::Error.is_terminal());
    }

    #[test]
    fn happy_path_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Completed));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Completed));
    }

    #[test]
    fn failure_transitions() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::ValidationFailed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Error));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Error));
    }

    #[test]
    fn error_state_is_re_enterable() {
        assert!(OrderStatus::Error.can_transition_to(OrderStatus::Pending));
        assert!(OrderStatus::Error.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Error.can_transition_to(OrderStatus::Error));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Error));
        assert!(!OrderStatus::ValidationFailed.can_transition_to(OrderStatus::Processing));
    }

    #[test]
    fn string_conversion_round_trips() {
        assert_eq!(OrderStatus::ValidationFailed.to_string(), "VALIDATION_FAILED");
        assert_eq!(
            "COMPLETED".parse::<OrderStatus>().unwrap(),
            OrderStatus::Completed
        );
        assert!("UNKNOWN".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn serde_uses_wire_form() {
        let json = serde_json::to_string(&OrderStatus::ValidationFailed).unwrap();
        assert_eq!(json, "\"VALIDATION_FAILED\"");

        let parsed: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, OrderStatus::ValidationFailed);
    }
}
