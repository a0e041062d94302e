use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::errors::SchedulingError;
use crate::domain::resources::{amount_problem, DoctorId, PatientId};

// ============================================================================
// Surgery Commands - Booking request
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeryRequest {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub surgery_type: String,
    pub scheduled_at: DateTime<Utc>,
    pub estimated_duration_minutes: i32,
    pub deposit_required: Decimal,
    #[serde(default)]
    pub notes: String,
}

impl SurgeryRequest {
    /// Check the request before any lock is taken.
    ///
    /// `clock_skew` widens the "not in the past" window for callers whose
    /// clocks lag slightly behind ours.
    pub fn validate(&self, now: DateTime<Utc>, clock_skew: Duration) -> Result<(), SchedulingError> {
        let mut problems = Vec::new();

        if self.patient_id.value() <= 0 {
            problems.push("patient_id must be positive".to_string());
        }
        if self.doctor_id.value() <= 0 {
            problems.push("doctor_id must be positive".to_string());
        }
        if self.surgery_type.trim().is_empty() {
            problems.push("surgery_type is required".to_string());
        }
        if self.estimated_duration_minutes <= 0 {
            problems.push(format!(
                "estimated_duration_minutes must be greater than zero (got {})",
                self.estimated_duration_minutes
            ));
        }
        if self.deposit_required <= Decimal::ZERO {
            problems.push(format!(
                "deposit_required must be greater than zero (got {})",
                self.deposit_required
            ));
        }
        if let Some(problem) = amount_problem("deposit_required", self.deposit_required) {
            problems.push(problem);
        }
        let earliest = now.checked_sub_signed(clock_skew).unwrap_or(DateTime::<Utc>::MIN_UTC);
        if self.scheduled_at < earliest {
            problems.push(format!(
                "scheduled_at {} is in the past",
                self.scheduled_at.to_rfc3339()
            ));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchedulingError::Validation(problems.join("; ")))
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
