use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Resource Value Objects
// ============================================================================

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn value(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(
    /// Identity of a doctor row
    DoctorId
);
row_id!(
    /// Identity of a patient row
    PatientId
);
row_id!(
    /// Identity of an operating theater row
    TheaterId
);
row_id!(
    /// Identity of a surgery schedule row
    SurgeryId
);

// ============================================================================
// Money
// ============================================================================

/// Deposits and charges carry at most this many decimal places
pub const AMOUNT_SCALE: u32 = 2;

/// Largest deposit or charge accepted from callers
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_99, AMOUNT_SCALE)
}

/// What is wrong with `amount` as a money value, if anything.
///
/// Sign rules differ per field and are checked by the caller.
pub fn amount_problem(field: &str, amount: Decimal) -> Option<String> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        Some(format!(
            "{field} must have at most {AMOUNT_SCALE} decimal places (got {amount})"
        ))
    } else if amount.abs() > max_amount() {
        Some(format!("{field} must not exceed {} (got {amount})", max_amount()))
    } else {
        None
    }
}

/// Operating theater status.
///
/// `Occupied` is owned by the scheduling engine; the registry may only move a
/// theater between `Available` and `Maintenance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TheaterStatus {
    Available,
    Occupied,
    Maintenance,
}

impl TheaterStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::Occupied => "Occupied",
            Self::Maintenance => "Maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Available" => Some(Self::Available),
            "Occupied" => Some(Self::Occupied),
            "Maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

impl fmt::Display for TheaterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
