//! Error types for the load planner.
//!
//! Run-scoped failures abort a packing run ([`PackingError`]); item-scoped
//! problems never do and end up as an [`UnplacedReason`] on the item.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for packing operations.
pub type Result<T> = std::result::Result<T, PackingError>;

/// Errors that abort a whole packing run.
///
/// A run that fails with one of these reports no placements at all.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PackingError {
    /// Missing or contradictory algorithm configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The vehicle envelope cannot hold anything.
    #[error("Invalid vehicle: {0}")]
    InvalidVehicle(String),

    /// The request contains no items.
    #[error("At least one item must be provided")]
    EmptyRequest,

    /// Every item of the request failed validation.
    #[error("None of the {0} submitted items is valid")]
    NoValidItems(usize),

    /// The caller abandoned the run.
    #[error("Packing run cancelled")]
    Cancelled,

    /// Internal fault (worker panicked, broken invariant).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PackingError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            PackingError::Configuration(_) => "configuration_error",
            PackingError::InvalidVehicle(_) => "invalid_vehicle",
            PackingError::EmptyRequest => "empty_request",
            PackingError::NoValidItems(_) => "no_valid_items",
            PackingError::Cancelled => "cancelled",
            PackingError::Internal(_) => "internal_error",
        }
    }
}

/// Reasons why an item could not be placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum UnplacedReason {
    /// Non-positive dimension/weight, zero quantity or duplicate id.
    InvalidInput(String),
    /// No orientation fits the vehicle envelope.
    CapacityExceeded,
    /// The item would push the vehicle over its maximum weight.
    WeightLimitExceeded,
    /// No candidate position satisfied geometry, support and weight rules.
    NoFeasiblePosition,
    /// The run's time or evaluation budget ran out before the item was tried.
    BudgetExceeded,
}

impl UnplacedReason {
    pub fn code(&self) -> &'static str {
        match self {
            UnplacedReason::InvalidInput(_) => "invalid_input",
            UnplacedReason::CapacityExceeded => "capacity_exceeded",
            UnplacedReason::WeightLimitExceeded => "weight_limit_exceeded",
            UnplacedReason::NoFeasiblePosition => "no_feasible_position",
            UnplacedReason::BudgetExceeded => "budget_exceeded",
        }
    }
}

impl std::fmt::Display for UnplacedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnplacedReason::InvalidInput(msg) => write!(f, "Invalid item: {}", msg),
            UnplacedReason::CapacityExceeded => write!(
                f,
                "Item exceeds the vehicle dimensions in every allowed orientation"
            ),
            UnplacedReason::WeightLimitExceeded => {
                write!(f, "Item exceeds the remaining vehicle weight capacity")
            }
            UnplacedReason::NoFeasiblePosition => {
                write!(f, "No stable position inside the vehicle found")
            }
            UnplacedReason::BudgetExceeded => {
                write!(f, "Packing budget exhausted before the item was processed")
            }
        }
    }
}

/// Illegal packing job transitions.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JobError {
    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: &'static str,
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(
            UnplacedReason::InvalidInput("x".into()).code(),
            "invalid_input"
        );
        assert_eq!(UnplacedReason::CapacityExceeded.code(), "capacity_exceeded");
        assert_eq!(UnplacedReason::BudgetExceeded.code(), "budget_exceeded");
    }

    #[test]
    fn reason_serializes_with_code_tag() {
        let json = serde_json::to_value(UnplacedReason::CapacityExceeded).unwrap();
        assert_eq!(json["code"], "capacity_exceeded");

        let json = serde_json::to_value(UnplacedReason::InvalidInput("bad".into())).unwrap();
        assert_eq!(json["code"], "invalid_input");
        assert_eq!(json["detail"], "bad");
    }

    #[test]
    fn packing_error_messages_are_readable() {
        let err = PackingError::Configuration("support percentage must be >= 0".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: support percentage must be >= 0"
        );
        assert_eq!(err.code(), "configuration_error");
        assert_eq!(PackingError::NoValidItems(3).code(), "no_valid_items");
    }
}
