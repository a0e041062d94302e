use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::surgery::SurgerySchedule;
use crate::store::{
    Entity, EntityStore, LockTarget, Query, StoreError, SurgeryFilter, Transaction,
    TransactionCoordinator,
};
use super::entities::{Doctor, OperatingTheater, Patient};
use super::value_objects::{amount_problem, DoctorId, PatientId, SurgeryId, TheaterId, TheaterStatus};

// ============================================================================
// Resource Registry - Guarded CRUD
// ============================================================================
//
// Plain record management for doctors, patients and theaters. Every write
// runs in its own transaction and takes the same row lock the scheduling
// engine takes, so it waits for in-flight bookings instead of racing them.
//
// State owned by the engine is out of reach:
// - `Doctor::is_available` is never written here
// - theater status moves only between Available and Maintenance
// - rows attached to an active booking cannot be deleted
//
// Locks follow the engine's order (doctor before patient).
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDoctor {
    pub name: String,
    #[serde(default)]
    pub contact_no: String,
    #[serde(default)]
    pub address: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DoctorPatch {
    pub name: Option<String>,
    pub contact_no: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    #[serde(default)]
    pub contact_no: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub doctor_id: Option<DoctorId>,
    #[serde(default)]
    pub deposit: Decimal,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientPatch {
    pub name: Option<String>,
    pub contact_no: Option<String>,
    pub address: Option<String>,
    /// New attending doctor
    pub doctor_id: Option<DoctorId>,
    pub deposit: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTheater {
    pub name: String,
    pub floor: i32,
    pub capacity: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TheaterPatch {
    pub name: Option<String>,
    pub floor: Option<i32>,
    pub capacity: Option<i32>,
    pub status: Option<TheaterStatus>,
}

/// Whether a doctor has an active booking on a given day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorAvailability {
    pub doctor_id: DoctorId,
    pub date: NaiveDate,
    pub is_available: bool,
    pub conflicting_surgery: Option<SurgeryId>,
}

#[derive(Clone)]
pub struct ResourceRegistry {
    coordinator: TransactionCoordinator,
}

impl ResourceRegistry {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            coordinator: TransactionCoordinator::new(store),
        }
    }

    // ------------------------------------------------------------------------
    // Doctors
    // ------------------------------------------------------------------------

    pub async fn create_doctor(&self, new: NewDoctor) -> Result<Doctor, StoreError> {
        require_name(&new.name)?;
        self.create(Doctor {
            id: DoctorId(0),
            name: new.name,
            contact_no: new.contact_no,
            address: new.address,
            is_available: true,
        })
        .await
    }

    pub async fn get_doctor(&self, id: DoctorId) -> Result<Option<Doctor>, StoreError> {
        self.fetch::<Doctor>(id).await
    }

    pub async fn list_doctors(&self) -> Result<Vec<Doctor>, StoreError> {
        self.query(Query::Doctors { name_contains: None }).await
    }

    pub async fn search_doctors(&self, name: &str) -> Result<Vec<Doctor>, StoreError> {
        self.query(Query::Doctors {
            name_contains: Some(name.to_string()),
        })
        .await
    }

    pub async fn update_doctor(&self, id: DoctorId, patch: DoctorPatch) -> Result<Doctor, StoreError> {
        if let Some(name) = &patch.name {
            require_name(name)?;
        }
        self.modify::<Doctor, _>(id, "update_doctor", move |doctor| {
            if let Some(name) = patch.name {
                doctor.name = name;
            }
            if let Some(contact_no) = patch.contact_no {
                doctor.contact_no = contact_no;
            }
            if let Some(address) = patch.address {
                doctor.address = address;
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_doctor(&self, id: DoctorId) -> Result<(), StoreError> {
        self.remove::<Doctor, _>(id, "delete_doctor", |doctor| {
            if doctor.is_available {
                Ok(())
            } else {
                Err(StoreError::Conflict(format!(
                    "doctor {} has an active booking",
                    doctor.id
                )))
            }
        })
        .await
    }

    /// Active booking of the doctor on `date`, if any
    pub async fn doctor_availability(
        &self,
        id: DoctorId,
        date: NaiveDate,
    ) -> Result<DoctorAvailability, StoreError> {
        self.coordinator
            .run_atomic("doctor_availability", move |tx| {
                Box::pin(async move {
                    if tx.get_row::<Doctor>(id).await?.is_none() {
                        return Err(StoreError::NotFound(Doctor::key_for(id)));
                    }

                    let conflicting_surgery = tx
                        .find_rows::<SurgerySchedule>(Query::Surgeries(SurgeryFilter::ByDoctor(id)))
                        .await?
                        .into_iter()
                        .find(|s| s.is_active() && s.scheduled_at.date_naive() == date)
                        .map(|s| s.id);

                    Ok(DoctorAvailability {
                        doctor_id: id,
                        date,
                        is_available: conflicting_surgery.is_none(),
                        conflicting_surgery,
                    })
                })
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Patients
    // ------------------------------------------------------------------------

    pub async fn create_patient(&self, new: NewPatient) -> Result<Patient, StoreError> {
        require_name(&new.name)?;
        require_deposit(new.deposit)?;
        let patient = Patient {
            id: PatientId(0),
            name: new.name,
            contact_no: new.contact_no,
            address: new.address,
            doctor_id: new.doctor_id,
            deposit: new.deposit,
        };

        let created = self
            .coordinator
            .run_atomic("create_patient", move |tx| {
                Box::pin(async move {
                    if let Some(doctor_id) = patient.doctor_id {
                        lock_attending(tx, doctor_id).await?;
                    }
                    tx.create_entity(patient).await
                })
            })
            .await?;

        tracing::info!(patient_id = %created.id, "Record created");
        Ok(created)
    }

    pub async fn get_patient(&self, id: PatientId) -> Result<Option<Patient>, StoreError> {
        self.fetch::<Patient>(id).await
    }

    pub async fn list_patients(&self) -> Result<Vec<Patient>, StoreError> {
        self.query(Query::Patients {
            name_contains: None,
            doctor_id: None,
        })
        .await
    }

    pub async fn search_patients(&self, name: &str) -> Result<Vec<Patient>, StoreError> {
        self.query(Query::Patients {
            name_contains: Some(name.to_string()),
            doctor_id: None,
        })
        .await
    }

    /// Patients whose attending doctor is `doctor_id`
    pub async fn patients_of_doctor(&self, doctor_id: DoctorId) -> Result<Vec<Patient>, StoreError> {
        self.query(Query::Patients {
            name_contains: None,
            doctor_id: Some(doctor_id),
        })
        .await
    }

    /// Deposit changes happen under the patient's row lock, so they serialize
    /// with booking debits and cancellation refunds.
    pub async fn update_patient(&self, id: PatientId, patch: PatientPatch) -> Result<Patient, StoreError> {
        if let Some(name) = &patch.name {
            require_name(name)?;
        }
        if let Some(deposit) = patch.deposit {
            require_deposit(deposit)?;
        }
        self.coordinator
            .run_atomic("update_patient", move |tx| {
                Box::pin(async move {
                    if let Some(doctor_id) = patch.doctor_id {
                        lock_attending(tx, doctor_id).await?;
                    }
                    let mut patient = tx
                        .lock_row::<Patient>(id)
                        .await?
                        .ok_or(StoreError::NotFound(Patient::key_for(id)))?;

                    if let Some(name) = patch.name {
                        patient.name = name;
                    }
                    if let Some(contact_no) = patch.contact_no {
                        patient.contact_no = contact_no;
                    }
                    if let Some(address) = patch.address {
                        patient.address = address;
                    }
                    if let Some(doctor_id) = patch.doctor_id {
                        patient.doctor_id = Some(doctor_id);
                    }
                    if let Some(deposit) = patch.deposit {
                        patient.deposit = deposit;
                    }
                    tx.save_entity(&patient).await?;
                    Ok(patient)
                })
            })
            .await
    }

    pub async fn delete_patient(&self, id: PatientId) -> Result<(), StoreError> {
        self.coordinator
            .run_atomic("delete_patient", move |tx| {
                Box::pin(async move {
                    let key = Patient::key_for(id);
                    if tx.lock_row::<Patient>(id).await?.is_none() {
                        return Err(StoreError::NotFound(key));
                    }

                    let active = tx
                        .find_rows::<SurgerySchedule>(Query::Surgeries(SurgeryFilter::ByPatient(id)))
                        .await?
                        .into_iter()
                        .any(|s| s.is_active());
                    if active {
                        return Err(StoreError::Conflict(format!(
                            "patient {id} has an active booking"
                        )));
                    }

                    tx.delete(key).await
                })
            })
            .await
    }

    // ------------------------------------------------------------------------
    // Operating theaters
    // ------------------------------------------------------------------------

    pub async fn create_theater(&self, new: NewTheater) -> Result<OperatingTheater, StoreError> {
        require_name(&new.name)?;
        require_capacity(new.capacity)?;
        self.create(OperatingTheater {
            id: TheaterId(0),
            name: new.name,
            floor: new.floor,
            capacity: new.capacity,
            status: TheaterStatus::Available,
        })
        .await
    }

    pub async fn get_theater(&self, id: TheaterId) -> Result<Option<OperatingTheater>, StoreError> {
        self.fetch::<OperatingTheater>(id).await
    }

    pub async fn list_theaters(&self) -> Result<Vec<OperatingTheater>, StoreError> {
        self.query(Query::Theaters { status: None }).await
    }

    /// Snapshot only; booking re-checks under lock
    pub async fn available_theaters(&self) -> Result<Vec<OperatingTheater>, StoreError> {
        self.query(Query::Theaters {
            status: Some(TheaterStatus::Available),
        })
        .await
    }

    pub async fn update_theater(
        &self,
        id: TheaterId,
        patch: TheaterPatch,
    ) -> Result<OperatingTheater, StoreError> {
        if let Some(name) = &patch.name {
            require_name(name)?;
        }
        if let Some(capacity) = patch.capacity {
            require_capacity(capacity)?;
        }
        self.modify::<OperatingTheater, _>(id, "update_theater", move |theater| {
            if let Some(status) = patch.status {
                check_status_change(theater.status, status)?;
                theater.status = status;
            }
            if let Some(name) = patch.name {
                theater.name = name;
            }
            if let Some(floor) = patch.floor {
                theater.floor = floor;
            }
            if let Some(capacity) = patch.capacity {
                theater.capacity = capacity;
            }
            Ok(())
        })
        .await
    }

    pub async fn delete_theater(&self, id: TheaterId) -> Result<(), StoreError> {
        self.remove::<OperatingTheater, _>(id, "delete_theater", |theater| {
            if theater.status == TheaterStatus::Occupied {
                Err(StoreError::Conflict(format!(
                    "operating theater {} is occupied",
                    theater.id
                )))
            } else {
                Ok(())
            }
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Surgeries (read-only; writes belong to the scheduling engine)
    // ------------------------------------------------------------------------

    pub async fn get_surgery(&self, id: SurgeryId) -> Result<Option<SurgerySchedule>, StoreError> {
        self.fetch::<SurgerySchedule>(id).await
    }

    pub async fn list_surgeries(&self) -> Result<Vec<SurgerySchedule>, StoreError> {
        self.query(Query::Surgeries(SurgeryFilter::All)).await
    }

    pub async fn surgeries_by_doctor(&self, id: DoctorId) -> Result<Vec<SurgerySchedule>, StoreError> {
        self.query(Query::Surgeries(SurgeryFilter::ByDoctor(id))).await
    }

    pub async fn surgeries_by_patient(&self, id: PatientId) -> Result<Vec<SurgerySchedule>, StoreError> {
        self.query(Query::Surgeries(SurgeryFilter::ByPatient(id))).await
    }

    // ------------------------------------------------------------------------
    // Generic single-row units of work
    // ------------------------------------------------------------------------

    async fn fetch<E: Entity>(&self, id: E::Id) -> Result<Option<E>, StoreError> {
        self.coordinator
            .run_atomic("fetch", move |tx| Box::pin(async move { tx.get_row::<E>(id).await }))
            .await
    }

    async fn query<E: Entity>(&self, query: Query) -> Result<Vec<E>, StoreError> {
        self.coordinator
            .run_atomic("query", move |tx| Box::pin(async move { tx.find_rows::<E>(query).await }))
            .await
    }

    async fn create<E: Entity>(&self, entity: E) -> Result<E, StoreError> {
        let created = self
            .coordinator
            .run_atomic("create", move |tx| {
                Box::pin(async move { tx.create_entity(entity).await })
            })
            .await?;

        tracing::info!(kind = %E::KIND, "Record created");
        Ok(created)
    }

    async fn modify<E, F>(&self, id: E::Id, operation: &'static str, change: F) -> Result<E, StoreError>
    where
        E: Entity,
        F: FnOnce(&mut E) -> Result<(), StoreError> + Send + 'static,
    {
        self.coordinator
            .run_atomic(operation, move |tx| {
                Box::pin(async move {
                    let mut entity = tx
                        .lock::<E>(LockTarget::Row(E::key_for(id)))
                        .await?
                        .ok_or(StoreError::NotFound(E::key_for(id)))?;
                    change(&mut entity)?;
                    tx.save_entity(&entity).await?;
                    Ok(entity)
                })
            })
            .await
    }

    async fn remove<E, F>(&self, id: E::Id, operation: &'static str, guard: F) -> Result<(), StoreError>
    where
        E: Entity,
        F: FnOnce(&E) -> Result<(), StoreError> + Send + 'static,
    {
        let key = E::key_for(id);
        self.coordinator
            .run_atomic(operation, move |tx| {
                Box::pin(async move {
                    let entity = tx.lock::<E>(LockTarget::Row(key)).await?;
                    guard(&entity.ok_or(StoreError::NotFound(key))?)?;
                    tx.delete(key).await
                })
            })
            .await?;

        tracing::info!(row = %key, "Record deleted");
        Ok(())
    }
}

/// The doctor must exist. Its lock keeps `delete_doctor` out until commit.
async fn lock_attending(tx: &mut (dyn Transaction + 'static), id: DoctorId) -> Result<(), StoreError> {
    match tx.lock_row::<Doctor>(id).await? {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(Doctor::key_for(id))),
    }
}

fn require_name(name: &str) -> Result<(), StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::Invalid("name is required".to_string()));
    }
    Ok(())
}

fn require_deposit(deposit: Decimal) -> Result<(), StoreError> {
    if deposit < Decimal::ZERO {
        return Err(StoreError::Invalid(format!(
            "deposit must not be negative (got {deposit})"
        )));
    }
    match amount_problem("deposit", deposit) {
        Some(problem) => Err(StoreError::Invalid(problem)),
        None => Ok(()),
    }
}

fn require_capacity(capacity: i32) -> Result<(), StoreError> {
    if capacity <= 0 {
        return Err(StoreError::Invalid(format!(
            "capacity must be greater than zero (got {capacity})"
        )));
    }
    Ok(())
}

/// `Occupied` is set and cleared by the scheduling engine only
fn check_status_change(from: TheaterStatus, to: TheaterStatus) -> Result<(), StoreError> {
    use TheaterStatus::*;
    match (from, to) {
        (a, b) if a == b => Ok(()),
        (Available, Maintenance) | (Maintenance, Available) => Ok(()),
        _ => Err(StoreError::Conflict(format!(
            "theater status cannot change from {from} to {to} outside a booking"
        ))),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
