use std::fmt;

use crate::domain::errors::ResourceKind;
use crate::domain::resources::{
    Doctor, DoctorId, OperatingTheater, Patient, PatientId, SurgeryId, TheaterId, TheaterStatus,
};
use crate::domain::surgery::SurgerySchedule;
use super::StoreError;

// ============================================================================
// Rows, keys and queries
// ============================================================================

/// Identity of a row across all four tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub kind: ResourceKind,
    pub id: i64,
}

impl RecordKey {
    pub const fn new(kind: ResourceKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Inclusive bounds covering every key of one table
    pub const fn table_bounds(kind: ResourceKind) -> (Self, Self) {
        (Self::new(kind, i64::MIN), Self::new(kind, i64::MAX))
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.kind, self.id)
    }
}

/// What `lock_for_update` should lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTarget {
    /// First theater (by id) whose status is `Available` once its lock is held
    AvailableTheater,
    Row(RecordKey),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Theater(OperatingTheater),
    Doctor(Doctor),
    Patient(Patient),
    Surgery(SurgerySchedule),
}

impl Record {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Theater(_) => ResourceKind::OperatingTheater,
            Self::Doctor(_) => ResourceKind::Doctor,
            Self::Patient(_) => ResourceKind::Patient,
            Self::Surgery(_) => ResourceKind::Surgery,
        }
    }

    pub fn key(&self) -> RecordKey {
        let id = match self {
            Self::Theater(t) => t.id.value(),
            Self::Doctor(d) => d.id.value(),
            Self::Patient(p) => p.id.value(),
            Self::Surgery(s) => s.id.value(),
        };
        RecordKey::new(self.kind(), id)
    }

    pub fn with_id(mut self, id: i64) -> Self {
        match &mut self {
            Self::Theater(t) => t.id = TheaterId(id),
            Self::Doctor(d) => d.id = DoctorId(id),
            Self::Patient(p) => p.id = PatientId(id),
            Self::Surgery(s) => s.id = SurgeryId(id),
        }
        self
    }

    /// True if this row holds a foreign key to `key`
    pub fn references(&self, key: RecordKey) -> bool {
        match (self, key.kind) {
            (Self::Surgery(s), ResourceKind::OperatingTheater) => s.operating_theater_id.value() == key.id,
            (Self::Surgery(s), ResourceKind::Doctor) => s.doctor_id.value() == key.id,
            (Self::Surgery(s), ResourceKind::Patient) => s.patient_id.value() == key.id,
            (Self::Patient(p), ResourceKind::Doctor) => p.doctor_id.map(DoctorId::value) == Some(key.id),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurgeryFilter {
    All,
    ByDoctor(DoctorId),
    ByPatient(PatientId),
}

/// Non-locking filtered reads. Name filters are case-insensitive substrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Theaters { status: Option<TheaterStatus> },
    Doctors { name_contains: Option<String> },
    Patients {
        name_contains: Option<String>,
        /// Attending doctor
        doctor_id: Option<DoctorId>,
    },
    Surgeries(SurgeryFilter),
}

impl Query {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Theaters { .. } => ResourceKind::OperatingTheater,
            Self::Doctors { .. } => ResourceKind::Doctor,
            Self::Patients { .. } => ResourceKind::Patient,
            Self::Surgeries(_) => ResourceKind::Surgery,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        match (self, record) {
            (Self::Theaters { status }, Record::Theater(t)) => status.map_or(true, |s| t.status == s),
            (Self::Doctors { name_contains }, Record::Doctor(d)) => name_matches(&d.name, name_contains),
            (Self::Patients { name_contains, doctor_id }, Record::Patient(p)) => {
                name_matches(&p.name, name_contains) && doctor_id.map_or(true, |id| p.doctor_id == Some(id))
            }
            (Self::Surgeries(filter), Record::Surgery(s)) => match filter {
                SurgeryFilter::All => true,
                SurgeryFilter::ByDoctor(id) => s.doctor_id == *id,
                SurgeryFilter::ByPatient(id) => s.patient_id == *id,
            },
            _ => false,
        }
    }
}

fn name_matches(name: &str, needle: &Option<String>) -> bool {
    match needle {
        Some(needle) => name.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

// ============================================================================
// Entity - typed view of a Record
// ============================================================================

pub trait Entity: Clone + Send + Sync + Sized + 'static {
    type Id: Copy + Send + Sync + Into<i64> + 'static;

    const KIND: ResourceKind;

    fn into_record(self) -> Record;

    fn from_record(record: Record) -> Result<Self, StoreError>;

    fn key_for(id: Self::Id) -> RecordKey {
        RecordKey::new(Self::KIND, id.into())
    }
}

macro_rules! entity_record {
    ($entity:ty, $id:ty, $kind:expr, $variant:ident) => {
        impl Entity for $entity {
            type Id = $id;

            const KIND: ResourceKind = $kind;

            fn into_record(self) -> Record {
                Record::$variant(self)
            }

            fn from_record(record: Record) -> Result<Self, StoreError> {
                match record {
                    Record::$variant(entity) => Ok(entity),
                    other => Err(StoreError::KindMismatch {
                        expected: Self::KIND,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

entity_record!(OperatingTheater, TheaterId, ResourceKind::OperatingTheater, Theater);
entity_record!(Doctor, DoctorId, ResourceKind::Doctor, Doctor);
entity_record!(Patient, PatientId, ResourceKind::Patient, Patient);
entity_record!(SurgerySchedule, SurgeryId, ResourceKind::Surgery, Surgery);

#[cfg(test)]
mod tests {
    use super::*;

    fn doctor(name: &str) -> Doctor {
        Doctor {
            id: DoctorId(4),
            name: name.to_string(),
            contact_no: String::new(),
            address: String::new(),
            is_available: true,
        }
    }

    #[test]
    fn test_record_key_ordering_groups_tables() {
        let theater = RecordKey::new(ResourceKind::OperatingTheater, 99);
        let doctor = RecordKey::new(ResourceKind::Doctor, 1);
        assert!(theater < doctor);

        let (low, high) = RecordKey::table_bounds(ResourceKind::Doctor);
        assert!(low <= doctor && doctor <= high);
        assert_eq!(doctor.to_string(), "doctor #1");
    }

    #[test]
    fn test_entity_conversion_rejects_wrong_kind() {
        let record = doctor("Dr. House").into_record();
        assert_eq!(record.key(), RecordKey::new(ResourceKind::Doctor, 4));

        let result = Patient::from_record(record);
        assert!(matches!(
            result,
            Err(StoreError::KindMismatch {
                expected: ResourceKind::Patient,
                found: ResourceKind::Doctor,
            })
        ));
    }

    #[test]
    fn test_name_query_is_case_insensitive() {
        let query = Query::Doctors {
            name_contains: Some("HOUSE".to_string()),
        };
        assert!(query.matches(&doctor("Dr. House").into_record()));
        assert!(!query.matches(&doctor("Dr. Wilson").into_record()));
    }

    #[test]
    fn test_patient_query_by_attending_doctor() {
        let patient = Patient {
            id: PatientId(1),
            name: "Cristina".to_string(),
            contact_no: String::new(),
            address: String::new(),
            doctor_id: Some(DoctorId(4)),
            deposit: Default::default(),
        }
        .into_record();

        let of = |id| Query::Patients {
            name_contains: None,
            doctor_id: Some(DoctorId(id)),
        };
        assert!(of(4).matches(&patient));
        assert!(!of(5).matches(&patient));
        assert!(patient.references(RecordKey::new(ResourceKind::Doctor, 4)));
        assert!(!patient.references(RecordKey::new(ResourceKind::Patient, 1)));
    }

    #[test]
    fn test_with_id_replaces_identity() {
        let record = doctor("Dr. Cuddy").into_record().with_id(12);
        assert_eq!(record.key().id, 12);
    }
}
