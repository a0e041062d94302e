use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::errors::{ResourceKind, SchedulingError};
use crate::domain::resources::{Doctor, OperatingTheater, Patient, SurgeryId};
use crate::store::{EntityStore, LockTarget, Transaction, TransactionCoordinator};

use super::aggregate::SurgerySchedule;
use super::commands::SurgeryRequest;
use super::value_objects::SurgeryAction;

// ============================================================================
// Scheduling Engine
// ============================================================================
//
// Orchestrates: Request → validate → run_atomic { lock → mutate → save }
//
// Lock order is fixed so concurrent callers never deadlock:
// - schedule:          theater → doctor → patient
// - complete / cancel: surgery → theater → doctor → patient
//
// Every state read that feeds a decision is taken after the row lock is held.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct SchedulingConfig {
    /// How far in the past `scheduled_at` may be and still count as "now"
    pub clock_skew_tolerance: chrono::Duration,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            clock_skew_tolerance: chrono::Duration::seconds(60),
        }
    }
}

#[derive(Clone)]
pub struct SchedulingEngine {
    coordinator: TransactionCoordinator,
    config: SchedulingConfig,
}

impl SchedulingEngine {
    pub fn new(store: Arc<dyn EntityStore>, config: SchedulingConfig) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
            config,
        }
    }

    /// Book a theater, the requested doctor and part of the patient's deposit
    pub async fn schedule(&self, request: SurgeryRequest) -> Result<SurgerySchedule, SchedulingError> {
        let now = Utc::now();

        // Rejected requests never reach the lock manager
        request.validate(now, self.config.clock_skew_tolerance)?;

        tracing::debug!(
            patient_id = %request.patient_id,
            doctor_id = %request.doctor_id,
            surgery_type = %request.surgery_type,
            deposit_required = %request.deposit_required,
            "Scheduling surgery"
        );

        let surgery = self
            .coordinator
            .run_atomic("schedule", move |tx| Box::pin(book(tx, request, now)))
            .await?;

        tracing::info!(
            surgery_id = %surgery.id,
            theater_id = %surgery.operating_theater_id,
            doctor_id = %surgery.doctor_id,
            patient_id = %surgery.patient_id,
            "✅ Surgery scheduled"
        );
        Ok(surgery)
    }

    /// Move a scheduled surgery into the theater. Resources stay claimed.
    pub async fn start(&self, surgery_id: SurgeryId) -> Result<SurgerySchedule, SchedulingError> {
        let now = Utc::now();
        let surgery = self
            .coordinator
            .run_atomic("start", move |tx| Box::pin(begin_procedure(tx, surgery_id, now)))
            .await?;

        tracing::info!(surgery_id = %surgery.id, "Surgery started");
        Ok(surgery)
    }

    /// Finish a surgery, freeing theater and doctor. The deposit is consumed.
    pub async fn complete(&self, surgery_id: SurgeryId) -> Result<SurgerySchedule, SchedulingError> {
        let now = Utc::now();
        let surgery = self
            .coordinator
            .run_atomic("complete", move |tx| {
                Box::pin(release(tx, surgery_id, SurgeryAction::Complete, now))
            })
            .await?;

        tracing::info!(surgery_id = %surgery.id, "Surgery completed");
        Ok(surgery)
    }

    /// Call off a scheduled surgery, freeing everything and refunding the deposit
    pub async fn cancel(&self, surgery_id: SurgeryId) -> Result<SurgerySchedule, SchedulingError> {
        let now = Utc::now();
        let surgery = self
            .coordinator
            .run_atomic("cancel", move |tx| {
                Box::pin(release(tx, surgery_id, SurgeryAction::Cancel, now))
            })
            .await?;

        tracing::info!(
            surgery_id = %surgery.id,
            refunded = %surgery.deposit_deducted,
            "Surgery cancelled"
        );
        Ok(surgery)
    }
}

// ============================================================================
// Units of work (run inside one transaction each)
// ============================================================================

async fn book(
    tx: &mut (dyn Transaction + 'static),
    request: SurgeryRequest,
    now: DateTime<Utc>,
) -> Result<SurgerySchedule, SchedulingError> {
    // 1. Theater
    let mut theater = tx
        .lock::<OperatingTheater>(LockTarget::AvailableTheater)
        .await?
        .ok_or(SchedulingError::NoResourceAvailable(ResourceKind::OperatingTheater))?;
    theater.occupy()?;
    tx.save_entity(&theater).await?;

    // 2. Doctor
    let mut doctor = tx
        .lock_row::<Doctor>(request.doctor_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::Doctor))?;
    doctor.claim()?;
    tx.save_entity(&doctor).await?;

    // 3. Patient deposit
    let mut patient = tx
        .lock_row::<Patient>(request.patient_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::Patient))?;
    patient.debit(request.deposit_required)?;
    tx.save_entity(&patient).await?;

    let surgery = tx
        .create_entity(SurgerySchedule::scheduled(request, theater.id, now))
        .await?;
    Ok(surgery)
}

async fn begin_procedure(
    tx: &mut (dyn Transaction + 'static),
    surgery_id: SurgeryId,
    now: DateTime<Utc>,
) -> Result<SurgerySchedule, SchedulingError> {
    let mut surgery = tx
        .lock_row::<SurgerySchedule>(surgery_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::Surgery))?;

    surgery.apply(SurgeryAction::Start, now)?;
    tx.save_entity(&surgery).await?;
    Ok(surgery)
}

/// Shared path of `complete` and `cancel`
async fn release(
    tx: &mut (dyn Transaction + 'static),
    surgery_id: SurgeryId,
    action: SurgeryAction,
    now: DateTime<Utc>,
) -> Result<SurgerySchedule, SchedulingError> {
    let mut surgery = tx
        .lock_row::<SurgerySchedule>(surgery_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::Surgery))?;

    // Status is checked under the surgery lock, so a second caller sees the
    // first one's outcome and fails here
    surgery.apply(action, now)?;

    let mut theater = tx
        .lock_row::<OperatingTheater>(surgery.operating_theater_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::OperatingTheater))?;
    theater.release();
    tx.save_entity(&theater).await?;

    let mut doctor = tx
        .lock_row::<Doctor>(surgery.doctor_id)
        .await?
        .ok_or(SchedulingError::NotFound(ResourceKind::Doctor))?;
    doctor.release();
    tx.save_entity(&doctor).await?;

    if action == SurgeryAction::Cancel {
        let mut patient = tx
            .lock_row::<Patient>(surgery.patient_id)
            .await?
            .ok_or(SchedulingError::NotFound(ResourceKind::Patient))?;
        patient.credit(surgery.deposit_deducted)?;
        tx.save_entity(&patient).await?;
    }

    tx.save_entity(&surgery).await?;
    Ok(surgery)
}

// ============================================================================
// Unit Tests
// ============================================================================
