use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::SchedulingError;
use crate::domain::resources::{DoctorId, PatientId, SurgeryId, TheaterId};
use super::commands::SurgeryRequest;
use super::value_objects::{SurgeryAction, SurgeryStatus};

// ============================================================================
// SurgerySchedule Aggregate - Root of a booking
// ============================================================================
//
// References the patient, doctor and theater by id only. Created by
// `schedule`, mutated only through `apply`.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurgerySchedule {
    // Identity
    pub id: SurgeryId,

    // Booked resources
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub operating_theater_id: TheaterId,

    // Procedure
    pub surgery_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub estimated_duration_minutes: i32,
    pub deposit_deducted: Decimal,
    pub status: SurgeryStatus,
    pub notes: String,

    // Audit
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SurgerySchedule {
    /// New booking in `Scheduled` state. The id is assigned by the store.
    pub fn scheduled(request: SurgeryRequest, theater_id: TheaterId, now: DateTime<Utc>) -> Self {
        Self {
            id: SurgeryId(0),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            operating_theater_id: theater_id,
            surgery_type: request.surgery_type,
            scheduled_at: request.scheduled_at,
            estimated_duration_minutes: request.estimated_duration_minutes,
            deposit_deducted: request.deposit_required,
            status: SurgeryStatus::Scheduled,
            notes: request.notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Move the status along the state machine
    pub fn apply(&mut self, action: SurgeryAction, now: DateTime<Utc>) -> Result<(), SchedulingError> {
        let next = self
            .status
            .transition(action)
            .ok_or(SchedulingError::InvalidTransition {
                from: self.status,
                action,
            })?;

        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn create_test_surgery() -> SurgerySchedule {
        let request = SurgeryRequest {
            patient_id: PatientId(3),
            doctor_id: DoctorId(2),
            surgery_type: "Cholecystectomy".to_string(),
            scheduled_at: Utc::now() + Duration::hours(4),
            estimated_duration_minutes: 75,
            deposit_required: Decimal::from(150),
            notes: "fasting since midnight".to_string(),
        };
        SurgerySchedule::scheduled(request, TheaterId(9), Utc::now())
    }

    #[test]
    fn test_scheduled_copies_request() {
        let surgery = create_test_surgery();

        assert_eq!(surgery.status, SurgeryStatus::Scheduled);
        assert_eq!(surgery.operating_theater_id, TheaterId(9));
        assert_eq!(surgery.deposit_deducted, Decimal::from(150));
        assert_eq!(surgery.notes, "fasting since midnight");
        assert!(surgery.is_active());
    }

    #[test]
    fn test_apply_updates_timestamp() {
        let mut surgery = create_test_surgery();
        let later = surgery.updated_at + Duration::minutes(10);

        surgery.apply(SurgeryAction::Start, later).unwrap();
        assert_eq!(surgery.status, SurgeryStatus::InProgress);
        assert_eq!(surgery.updated_at, later);

        surgery.apply(SurgeryAction::Complete, later).unwrap();
        assert!(!surgery.is_active());
    }

    #[test]
    fn test_apply_rejects_cancel_after_start() {
        let mut surgery = create_test_surgery();
        surgery.apply(SurgeryAction::Start, Utc::now()).unwrap();

        let result = surgery.apply(SurgeryAction::Cancel, Utc::now());
        assert!(matches!(
            result,
            Err(SchedulingError::InvalidTransition {
                from: SurgeryStatus::InProgress,
                action: SurgeryAction::Cancel,
            })
        ));
        assert_eq!(surgery.status, SurgeryStatus::InProgress);
    }
}
