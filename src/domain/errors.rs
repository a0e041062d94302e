use rust_decimal::Decimal;
use std::fmt;

use crate::store::StoreError;
use super::surgery::{SurgeryAction, SurgeryStatus};

// ============================================================================
// Scheduling Errors
// ============================================================================
//
// Every variant aborts the enclosing transaction before commit. None of them
// is retried by the engine itself; see `IsTransient` for the caller side.
//
// ============================================================================

/// The kind of row an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    OperatingTheater,
    Doctor,
    Patient,
    Surgery,
}

impl ResourceKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OperatingTheater => "operating theater",
            Self::Doctor => "doctor",
            Self::Patient => "patient",
            Self::Surgery => "surgery",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulingError {
    #[error("Invalid booking request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(ResourceKind),

    #[error("No {0} available")]
    NoResourceAvailable(ResourceKind),

    #[error("{0} is already booked")]
    ResourceBusy(ResourceKind),

    #[error("Insufficient deposit: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("Deposit {balance} cannot absorb {amount}")]
    DepositOverflow { balance: Decimal, amount: Decimal },

    #[error("Cannot {action} a surgery in status {from}")]
    InvalidTransition {
        from: SurgeryStatus,
        action: SurgeryAction,
    },

    #[error("Entity store failure: {0}")]
    Store(#[from] StoreError),
}

impl SchedulingError {
    /// Short label used for metrics and log fields
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::NoResourceAvailable(_) => "no_resource_available",
            Self::ResourceBusy(_) => "resource_busy",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::DepositOverflow { .. } => "deposit_overflow",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Store(_) => "store",
        }
    }
}
