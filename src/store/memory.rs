use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::ResourceKind;
use crate::domain::resources::TheaterStatus;
use super::{
    EntityStore, LockManager, LockTarget, Query, Record, RecordKey, RowLock, StoreError,
    Transaction,
};

// ============================================================================
// In-Memory Entity Store
// ============================================================================
//
// Committed rows live in one ordered map keyed by (table, id). A transaction
// stages its writes privately (reads see them) and applies them under the
// table write lock on commit, before its row locks are released.
//
// ============================================================================

type Rows = BTreeMap<RecordKey, Record>;

#[derive(Default)]
struct Shared {
    rows: RwLock<Rows>,
    locks: LockManager,
    sequences: DashMap<ResourceKind, i64>,
}

impl Shared {
    fn next_id(&self, kind: ResourceKind) -> i64 {
        let mut last = self.sequences.entry(kind).or_insert(0);
        *last += 1;
        *last
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    shared: Arc<Shared>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locks(&self) -> &LockManager {
        &self.shared.locks
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        Ok(Box::new(MemoryTransaction {
            id: Uuid::new_v4(),
            shared: self.shared.clone(),
            held: HashMap::new(),
            staged: BTreeMap::new(),
        }))
    }
}

pub struct MemoryTransaction {
    id: Uuid,
    shared: Arc<Shared>,
    held: HashMap<RecordKey, RowLock>,
    /// `None` marks a staged delete
    staged: BTreeMap<RecordKey, Option<Record>>,
}

impl MemoryTransaction {
    /// Row as this transaction sees it
    async fn current(&self, key: RecordKey) -> Option<Record> {
        if let Some(staged) = self.staged.get(&key) {
            return staged.clone();
        }
        self.shared.rows.read().await.get(&key).cloned()
    }

    /// Whole table as this transaction sees it, ordered by id
    async fn table(&self, kind: ResourceKind) -> Vec<Record> {
        let (low, high) = RecordKey::table_bounds(kind);

        let mut merged: Rows = {
            let rows = self.shared.rows.read().await;
            rows.range(low..=high)
                .map(|(key, record)| (*key, record.clone()))
                .collect()
        };

        for (key, staged) in self.staged.range(low..=high) {
            match staged {
                Some(record) => {
                    merged.insert(*key, record.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        merged.into_values().collect()
    }

    /// Take the row lock unless already held; returns true if newly taken
    async fn hold(&mut self, key: RecordKey) -> bool {
        if self.held.contains_key(&key) {
            return false;
        }
        let lock = self.shared.locks.acquire(key, self.id).await;
        self.held.insert(key, lock);
        true
    }

    async fn lock_row(&mut self, key: RecordKey) -> Option<Record> {
        let fresh = self.hold(key).await;
        let row = self.current(key).await;
        if row.is_none() && fresh {
            self.held.remove(&key);
        }
        row
    }

    async fn lock_available_theater(&mut self) -> Option<Record> {
        let candidates: Vec<RecordKey> = self
            .table(ResourceKind::OperatingTheater)
            .await
            .into_iter()
            .filter(|record| is_available_theater(record))
            .map(|record| record.key())
            .collect();

        for key in candidates {
            let fresh = self.hold(key).await;

            // Another transaction may have claimed it while we waited
            match self.current(key).await {
                Some(record) if is_available_theater(&record) => return Some(record),
                _ => {
                    if fresh {
                        self.held.remove(&key);
                    }
                }
            }
        }

        None
    }
}

/// Tables holding foreign keys to rows of `kind`
fn referencing_tables(kind: ResourceKind) -> &'static [ResourceKind] {
    match kind {
        ResourceKind::Doctor => &[ResourceKind::Surgery, ResourceKind::Patient],
        ResourceKind::OperatingTheater | ResourceKind::Patient => &[ResourceKind::Surgery],
        ResourceKind::Surgery => &[],
    }
}

fn is_available_theater(record: &Record) -> bool {
    matches!(record, Record::Theater(t) if t.status == TheaterStatus::Available)
}

#[async_trait]
impl Transaction for MemoryTransaction {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn lock_for_update(&mut self, target: LockTarget) -> Result<Option<Record>, StoreError> {
        Ok(match target {
            LockTarget::AvailableTheater => self.lock_available_theater().await,
            LockTarget::Row(key) => self.lock_row(key).await,
        })
    }

    async fn get(&mut self, key: RecordKey) -> Result<Option<Record>, StoreError> {
        Ok(self.current(key).await)
    }

    async fn find(&mut self, query: Query) -> Result<Vec<Record>, StoreError> {
        Ok(self
            .table(query.kind())
            .await
            .into_iter()
            .filter(|record| query.matches(record))
            .collect())
    }

    async fn create(&mut self, record: Record) -> Result<Record, StoreError> {
        let id = self.shared.next_id(record.kind());
        let record = record.with_id(id);
        let key = record.key();

        self.hold(key).await;
        self.staged.insert(key, Some(record.clone()));
        Ok(record)
    }

    async fn save(&mut self, record: Record) -> Result<(), StoreError> {
        let key = record.key();

        if !self.held.contains_key(&key) {
            return Err(StoreError::NotLocked(key));
        }
        if self.current(key).await.is_none() {
            return Err(StoreError::NotFound(key));
        }

        self.staged.insert(key, Some(record));
        Ok(())
    }

    async fn delete(&mut self, key: RecordKey) -> Result<(), StoreError> {
        if self.lock_row(key).await.is_none() {
            return Err(StoreError::NotFound(key));
        }

        for &kind in referencing_tables(key.kind) {
            let referenced = self
                .table(kind)
                .await
                .iter()
                .any(|record| record.references(key));
            if referenced {
                return Err(StoreError::Conflict(format!(
                    "{key} is still referenced by a {kind}"
                )));
            }
        }

        self.staged.insert(key, None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            id,
            shared,
            held,
            staged,
        } = *self;
        let writes = staged.len();

        {
            let mut rows = shared.rows.write().await;
            for (key, record) in staged {
                match record {
                    Some(record) => {
                        rows.insert(key, record);
                    }
                    None => {
                        rows.remove(&key);
                    }
                }
            }
        }

        // Locks go only after the writes are visible
        drop(held);

        tracing::trace!(tx_id = %id, writes, "In-memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        tracing::trace!(
            tx_id = %self.id,
            discarded = self.staged.len(),
            "In-memory transaction rolled back"
        );
        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
