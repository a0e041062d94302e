// ============================================================================
// Entity Store - Transactional row access
// ============================================================================
//
// Everything the scheduling engine and the registry touch goes through a
// `Transaction` opened by an `EntityStore`:
//
// - `lock_for_update` takes an exclusive row lock (blocking, never failing on
//   contention) and re-reads the row under that lock
// - writes are staged and become visible to other transactions only on commit
// - commit, rollback and drop all release every lock the transaction holds
//
// Backends:
// - memory/   - in-process tables + `LockManager` (mutex per row)
// - postgres/ - `SELECT ... FOR UPDATE` inside a sqlx transaction
//
// ============================================================================

mod coordinator;
mod locks;
mod memory;
mod postgres;
mod records;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::ResourceKind;

pub use coordinator::TransactionCoordinator;
pub use locks::{LockManager, RowLock};
pub use memory::InMemoryStore;
pub use postgres::PgEntityStore;
pub use records::{Entity, LockTarget, Query, Record, RecordKey, SurgeryFilter};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(RecordKey),

    #[error("{0} is not locked by this transaction")]
    NotLocked(RecordKey),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid value: {0}")]
    Invalid(String),

    #[error("Expected a {expected} record, found a {found} record")]
    KindMismatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// One open unit of work against the entity tables
#[async_trait]
pub trait Transaction: Send {
    /// Identifier used in log fields
    fn id(&self) -> Uuid;

    /// Lock the targeted row exclusively and return its current state
    async fn lock_for_update(&mut self, target: LockTarget) -> Result<Option<Record>, StoreError>;

    /// Plain read without taking a lock
    async fn get(&mut self, key: RecordKey) -> Result<Option<Record>, StoreError>;

    async fn find(&mut self, query: Query) -> Result<Vec<Record>, StoreError>;

    /// Insert a new row. The id carried by `record` is ignored; the stored
    /// record with its assigned id is returned.
    async fn create(&mut self, record: Record) -> Result<Record, StoreError>;

    /// Overwrite a row previously locked by this transaction
    async fn save(&mut self, record: Record) -> Result<(), StoreError>;

    async fn delete(&mut self, key: RecordKey) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError>;
}

// ============================================================================
// Typed access on top of `Record`
// ============================================================================

impl dyn Transaction + '_ {
    pub async fn lock<E: Entity>(&mut self, target: LockTarget) -> Result<Option<E>, StoreError> {
        self.lock_for_update(target)
            .await?
            .map(E::from_record)
            .transpose()
    }

    pub async fn lock_row<E: Entity>(&mut self, id: E::Id) -> Result<Option<E>, StoreError> {
        self.lock::<E>(LockTarget::Row(E::key_for(id))).await
    }

    pub async fn get_row<E: Entity>(&mut self, id: E::Id) -> Result<Option<E>, StoreError> {
        self.get(E::key_for(id))
            .await?
            .map(E::from_record)
            .transpose()
    }

    pub async fn find_rows<E: Entity>(&mut self, query: Query) -> Result<Vec<E>, StoreError> {
        self.find(query)
            .await?
            .into_iter()
            .map(E::from_record)
            .collect()
    }

    pub async fn create_entity<E: Entity>(&mut self, entity: E) -> Result<E, StoreError> {
        let created = self.create(entity.into_record()).await?;
        E::from_record(created)
    }

    pub async fn save_entity<E: Entity>(&mut self, entity: &E) -> Result<(), StoreError> {
        self.save(entity.clone().into_record()).await
    }
}
