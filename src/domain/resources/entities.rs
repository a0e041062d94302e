use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{ResourceKind, SchedulingError};
use super::value_objects::{DoctorId, PatientId, TheaterId, TheaterStatus};

// ============================================================================
// Resource Entities
// ============================================================================
//
// Rows booked by a surgery. A surgery references them by id only, so they can
// be edited through the registry whenever no booking transaction holds them.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: DoctorId,
    pub name: String,
    pub contact_no: String,
    pub address: String,
    /// False iff the doctor is attached to a non-terminal surgery
    pub is_available: bool,
}

impl Doctor {
    /// Claim the doctor for a booking
    pub fn claim(&mut self) -> Result<(), SchedulingError> {
        if !self.is_available {
            return Err(SchedulingError::ResourceBusy(ResourceKind::Doctor));
        }
        self.is_available = false;
        Ok(())
    }

    pub fn release(&mut self) {
        self.is_available = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub contact_no: String,
    pub address: String,
    /// Attending doctor, independent of any booking
    #[serde(default)]
    pub doctor_id: Option<DoctorId>,
    pub deposit: Decimal,
}

impl Patient {
    /// Take `amount` out of the deposit; the deposit never goes negative
    pub fn debit(&mut self, amount: Decimal) -> Result<(), SchedulingError> {
        if self.deposit < amount {
            return Err(SchedulingError::InsufficientFunds {
                available: self.deposit,
                required: amount,
            });
        }
        self.deposit = self
            .deposit
            .checked_sub(amount)
            .ok_or(SchedulingError::DepositOverflow {
                balance: self.deposit,
                amount,
            })?;
        Ok(())
    }

    /// Return `amount` to the deposit. Fails instead of wrapping if the
    /// balance cannot represent the sum.
    pub fn credit(&mut self, amount: Decimal) -> Result<(), SchedulingError> {
        self.deposit = self
            .deposit
            .checked_add(amount)
            .ok_or(SchedulingError::DepositOverflow {
                balance: self.deposit,
                amount,
            })?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingTheater {
    pub id: TheaterId,
    pub name: String,
    pub floor: i32,
    pub capacity: i32,
    pub status: TheaterStatus,
}

impl OperatingTheater {
    pub fn occupy(&mut self) -> Result<(), SchedulingError> {
        if self.status != TheaterStatus::Available {
            return Err(SchedulingError::NoResourceAvailable(ResourceKind::OperatingTheater));
        }
        self.status = TheaterStatus::Occupied;
        Ok(())
    }

    pub fn release(&mut self) {
        self.status = TheaterStatus::Available;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
