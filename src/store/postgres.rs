use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row};
use std::collections::HashSet;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::domain::errors::ResourceKind;
use crate::domain::resources::{
    Doctor, DoctorId, OperatingTheater, Patient, PatientId, SurgeryId, TheaterId, TheaterStatus,
};
use crate::domain::surgery::{SurgerySchedule, SurgeryStatus};
use super::{
    EntityStore, LockTarget, Query, Record, RecordKey, StoreError, SurgeryFilter, Transaction,
};

// ============================================================================
// PostgreSQL Entity Store
// ============================================================================
//
// Row locks are PostgreSQL's own: `SELECT ... FOR UPDATE` inside a sqlx
// transaction. Locks are held until the transaction ends, so a theater that
// turns out to be taken after the wait stays locked until then.
//
// ============================================================================

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS doctors (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        contact_no TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        is_available BOOLEAN NOT NULL DEFAULT TRUE
    )"#,
    r#"CREATE TABLE IF NOT EXISTS patients (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        contact_no TEXT NOT NULL DEFAULT '',
        address TEXT NOT NULL DEFAULT '',
        doctor_id BIGINT REFERENCES doctors (id),
        deposit NUMERIC NOT NULL DEFAULT 0 CHECK (deposit >= 0)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS operating_theaters (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        floor INTEGER NOT NULL,
        capacity INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'Available'
            CHECK (status IN ('Available', 'Occupied', 'Maintenance'))
    )"#,
    r#"CREATE TABLE IF NOT EXISTS surgery_schedules (
        id BIGSERIAL PRIMARY KEY,
        patient_id BIGINT NOT NULL REFERENCES patients (id),
        doctor_id BIGINT NOT NULL REFERENCES doctors (id),
        operating_theater_id BIGINT NOT NULL REFERENCES operating_theaters (id),
        surgery_type TEXT NOT NULL,
        scheduled_at TIMESTAMPTZ NOT NULL,
        estimated_duration_minutes INTEGER NOT NULL CHECK (estimated_duration_minutes > 0),
        deposit_deducted NUMERIC NOT NULL,
        status TEXT NOT NULL
            CHECK (status IN ('Scheduled', 'In Progress', 'Completed', 'Cancelled')),
        notes TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_surgery_schedules_doctor ON surgery_schedules (doctor_id)",
    "CREATE INDEX IF NOT EXISTS idx_surgery_schedules_patient ON surgery_schedules (patient_id)",
    "CREATE INDEX IF NOT EXISTS idx_patients_doctor ON patients (doctor_id)",
];

const THEATER_COLUMNS: &str = "id, name, floor, capacity, status";
const DOCTOR_COLUMNS: &str = "id, name, contact_no, address, is_available";
const PATIENT_COLUMNS: &str = "id, name, contact_no, address, doctor_id, deposit";
const SURGERY_COLUMNS: &str = "id, patient_id, doctor_id, operating_theater_id, surgery_type, \
     scheduled_at, estimated_duration_minutes, deposit_deducted, status, notes, created_at, updated_at";

// SQLSTATE codes we translate
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

fn table_name(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::OperatingTheater => "operating_theaters",
        ResourceKind::Doctor => "doctors",
        ResourceKind::Patient => "patients",
        ResourceKind::Surgery => "surgery_schedules",
    }
}

fn columns(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::OperatingTheater => THEATER_COLUMNS,
        ResourceKind::Doctor => DOCTOR_COLUMNS,
        ResourceKind::Patient => PATIENT_COLUMNS,
        ResourceKind::Surgery => SURGERY_COLUMNS,
    }
}

fn select_by_id(kind: ResourceKind, for_update: bool) -> String {
    format!(
        "SELECT {} FROM {} WHERE id = $1{}",
        columns(kind),
        table_name(kind),
        if for_update { " FOR UPDATE" } else { "" }
    )
}

/// ILIKE pattern matching `needle` anywhere, with wildcards in it escaped
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        match db.code().as_deref() {
            Some(FOREIGN_KEY_VIOLATION) => return StoreError::Conflict(db.message().to_string()),
            Some(CHECK_VIOLATION) => return StoreError::Invalid(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Database(err)
}

// ============================================================================
// Row decoding
// ============================================================================

fn decode(kind: ResourceKind, row: &PgRow) -> Result<Record, StoreError> {
    Ok(match kind {
        ResourceKind::OperatingTheater => {
            let status: String = row.try_get("status")?;
            Record::Theater(OperatingTheater {
                id: TheaterId(row.try_get("id")?),
                name: row.try_get("name")?,
                floor: row.try_get("floor")?,
                capacity: row.try_get("capacity")?,
                status: TheaterStatus::parse(&status)
                    .ok_or_else(|| StoreError::Corrupt(format!("theater status '{status}'")))?,
            })
        }
        ResourceKind::Doctor => Record::Doctor(Doctor {
            id: DoctorId(row.try_get("id")?),
            name: row.try_get("name")?,
            contact_no: row.try_get("contact_no")?,
            address: row.try_get("address")?,
            is_available: row.try_get("is_available")?,
        }),
        ResourceKind::Patient => Record::Patient(Patient {
            id: PatientId(row.try_get("id")?),
            name: row.try_get("name")?,
            contact_no: row.try_get("contact_no")?,
            address: row.try_get("address")?,
            doctor_id: row.try_get::<Option<i64>, _>("doctor_id")?.map(DoctorId),
            deposit: row.try_get::<Decimal, _>("deposit")?,
        }),
        ResourceKind::Surgery => {
            let status: String = row.try_get("status")?;
            Record::Surgery(SurgerySchedule {
                id: SurgeryId(row.try_get("id")?),
                patient_id: PatientId(row.try_get("patient_id")?),
                doctor_id: DoctorId(row.try_get("doctor_id")?),
                operating_theater_id: TheaterId(row.try_get("operating_theater_id")?),
                surgery_type: row.try_get("surgery_type")?,
                scheduled_at: row.try_get("scheduled_at")?,
                estimated_duration_minutes: row.try_get("estimated_duration_minutes")?,
                deposit_deducted: row.try_get("deposit_deducted")?,
                status: SurgeryStatus::parse(&status)
                    .ok_or_else(|| StoreError::Corrupt(format!("surgery status '{status}'")))?,
                notes: row.try_get("notes")?,
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            })
        }
    })
}

// ============================================================================
// Store
// ============================================================================

#[derive(Clone)]
pub struct PgEntityStore {
    pool: PgPool,
}

impl PgEntityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        tracing::info!(
            max_connections = config.max_connections,
            "Connecting to PostgreSQL..."
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect(&config.url)
            .await?;

        tracing::info!("✅ Connected to PostgreSQL");
        Ok(Self::new(pool))
    }

    /// Create the tables if they do not exist yet
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        tracing::info!(statements = SCHEMA.len(), "Schema is up to date");
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PgEntityStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTransaction {
            id: Uuid::new_v4(),
            tx,
            locked: HashSet::new(),
        }))
    }
}

pub struct PgTransaction {
    id: Uuid,
    tx: sqlx::Transaction<'static, Postgres>,
    locked: HashSet<RecordKey>,
}

impl PgTransaction {
    async fn fetch(&mut self, key: RecordKey, for_update: bool) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query(&select_by_id(key.kind, for_update))
            .bind(key.id)
            .fetch_optional(&mut *self.tx)
            .await?;

        match row {
            Some(row) => {
                if for_update {
                    self.locked.insert(key);
                }
                decode(key.kind, &row).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn lock_available_theater(&mut self) -> Result<Option<Record>, StoreError> {
        let candidates: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM operating_theaters WHERE status = $1 ORDER BY id",
        )
        .bind(TheaterStatus::Available.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        for id in candidates {
            let key = RecordKey::new(ResourceKind::OperatingTheater, id);
            match self.fetch(key, true).await? {
                Some(Record::Theater(theater)) if theater.status == TheaterStatus::Available => {
                    return Ok(Some(Record::Theater(theater)));
                }
                _ => {
                    tracing::debug!(tx_id = %self.id, row = %key, "Theater taken while waiting, trying next");
                }
            }
        }

        Ok(None)
    }

    async fn insert(&mut self, record: &Record) -> Result<i64, StoreError> {
        let query = match record {
            Record::Theater(t) => sqlx::query_scalar::<_, i64>(
                "INSERT INTO operating_theaters (name, floor, capacity, status) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(t.name.clone())
            .bind(t.floor)
            .bind(t.capacity)
            .bind(t.status.as_str()),
            Record::Doctor(d) => sqlx::query_scalar::<_, i64>(
                "INSERT INTO doctors (name, contact_no, address, is_available) \
                 VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(d.name.clone())
            .bind(d.contact_no.clone())
            .bind(d.address.clone())
            .bind(d.is_available),
            Record::Patient(p) => sqlx::query_scalar::<_, i64>(
                "INSERT INTO patients (name, contact_no, address, doctor_id, deposit) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING id",
            )
            .bind(p.name.clone())
            .bind(p.contact_no.clone())
            .bind(p.address.clone())
            .bind(p.doctor_id.map(DoctorId::value))
            .bind(p.deposit),
            Record::Surgery(s) => sqlx::query_scalar::<_, i64>(
                "INSERT INTO surgery_schedules (patient_id, doctor_id, operating_theater_id, \
                 surgery_type, scheduled_at, estimated_duration_minutes, deposit_deducted, status, \
                 notes, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING id",
            )
            .bind(s.patient_id.value())
            .bind(s.doctor_id.value())
            .bind(s.operating_theater_id.value())
            .bind(s.surgery_type.clone())
            .bind(s.scheduled_at)
            .bind(s.estimated_duration_minutes)
            .bind(s.deposit_deducted)
            .bind(s.status.as_str())
            .bind(s.notes.clone())
            .bind(s.created_at)
            .bind(s.updated_at),
        };

        query.fetch_one(&mut *self.tx).await.map_err(map_db_error)
    }

    async fn update(&mut self, record: &Record) -> Result<u64, StoreError> {
        let query = match record {
            Record::Theater(t) => sqlx::query(
                "UPDATE operating_theaters SET name = $2, floor = $3, capacity = $4, status = $5 \
                 WHERE id = $1",
            )
            .bind(t.id.value())
            .bind(t.name.clone())
            .bind(t.floor)
            .bind(t.capacity)
            .bind(t.status.as_str()),
            Record::Doctor(d) => sqlx::query(
                "UPDATE doctors SET name = $2, contact_no = $3, address = $4, is_available = $5 \
                 WHERE id = $1",
            )
            .bind(d.id.value())
            .bind(d.name.clone())
            .bind(d.contact_no.clone())
            .bind(d.address.clone())
            .bind(d.is_available),
            Record::Patient(p) => sqlx::query(
                "UPDATE patients SET name = $2, contact_no = $3, address = $4, doctor_id = $5, \
                 deposit = $6 WHERE id = $1",
            )
            .bind(p.id.value())
            .bind(p.name.clone())
            .bind(p.contact_no.clone())
            .bind(p.address.clone())
            .bind(p.doctor_id.map(DoctorId::value))
            .bind(p.deposit),
            Record::Surgery(s) => sqlx::query(
                "UPDATE surgery_schedules SET surgery_type = $2, scheduled_at = $3, \
                 estimated_duration_minutes = $4, deposit_deducted = $5, status = $6, notes = $7, \
                 updated_at = $8 WHERE id = $1",
            )
            .bind(s.id.value())
            .bind(s.surgery_type.clone())
            .bind(s.scheduled_at)
            .bind(s.estimated_duration_minutes)
            .bind(s.deposit_deducted)
            .bind(s.status.as_str())
            .bind(s.notes.clone())
            .bind(s.updated_at),
        };

        let result = query.execute(&mut *self.tx).await.map_err(map_db_error)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn lock_for_update(&mut self, target: LockTarget) -> Result<Option<Record>, StoreError> {
        match target {
            LockTarget::AvailableTheater => self.lock_available_theater().await,
            LockTarget::Row(key) => self.fetch(key, true).await,
        }
    }

    async fn get(&mut self, key: RecordKey) -> Result<Option<Record>, StoreError> {
        self.fetch(key, false).await
    }

    async fn find(&mut self, query: Query) -> Result<Vec<Record>, StoreError> {
        let kind = query.kind();
        let base = format!("SELECT {} FROM {}", columns(kind), table_name(kind));

        let rows = match query {
            Query::Theaters { status } => {
                sqlx::query(&format!("{base} WHERE ($1::text IS NULL OR status = $1) ORDER BY id"))
                    .bind(status.map(|s| s.as_str()))
                    .fetch_all(&mut *self.tx)
                    .await?
            }
            Query::Doctors { name_contains } => {
                sqlx::query(&format!("{base} WHERE ($1::text IS NULL OR name ILIKE $1) ORDER BY id"))
                    .bind(name_contains.as_deref().map(contains_pattern))
                    .fetch_all(&mut *self.tx)
                    .await?
            }
            Query::Patients { name_contains, doctor_id } => {
                sqlx::query(&format!(
                    "{base} WHERE ($1::text IS NULL OR name ILIKE $1) \
                     AND ($2::bigint IS NULL OR doctor_id = $2) ORDER BY id"
                ))
                .bind(name_contains.as_deref().map(contains_pattern))
                .bind(doctor_id.map(DoctorId::value))
                .fetch_all(&mut *self.tx)
                .await?
            }
            Query::Surgeries(filter) => {
                let (doctor, patient) = match filter {
                    SurgeryFilter::All => (None, None),
                    SurgeryFilter::ByDoctor(id) => (Some(id.value()), None),
                    SurgeryFilter::ByPatient(id) => (None, Some(id.value())),
                };
                sqlx::query(&format!(
                    "{base} WHERE ($1::bigint IS NULL OR doctor_id = $1) \
                     AND ($2::bigint IS NULL OR patient_id = $2) ORDER BY id"
                ))
                .bind(doctor)
                .bind(patient)
                .fetch_all(&mut *self.tx)
                .await?
            }
        };

        rows.iter().map(|row| decode(kind, row)).collect()
    }

    async fn create(&mut self, record: Record) -> Result<Record, StoreError> {
        let id = self.insert(&record).await?;
        let record = record.with_id(id);

        // Freshly inserted rows are locked by the inserting transaction
        self.locked.insert(record.key());
        Ok(record)
    }

    async fn save(&mut self, record: Record) -> Result<(), StoreError> {
        let key = record.key();
        if !self.locked.contains(&key) {
            return Err(StoreError::NotLocked(key));
        }

        match self.update(&record).await? {
            0 => Err(StoreError::NotFound(key)),
            _ => Ok(()),
        }
    }

    async fn delete(&mut self, key: RecordKey) -> Result<(), StoreError> {
        if self.fetch(key, true).await?.is_none() {
            return Err(StoreError::NotFound(key));
        }

        sqlx::query(&format!("DELETE FROM {} WHERE id = $1", table_name(key.kind)))
            .bind(key.id)
            .execute(&mut *self.tx)
            .await
            .map_err(map_db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { id, tx, .. } = *self;
        tx.commit().await?;
        tracing::trace!(tx_id = %id, "PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgTransaction { id, tx, .. } = *self;
        tx.rollback().await?;
        tracing::trace!(tx_id = %id, "PostgreSQL transaction rolled back");
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
//
// Statement shapes only; behaviour against a live server lives in
// tests/postgres_store.rs.
//
