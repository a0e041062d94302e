use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::RecordKey;

// ============================================================================
// Resource Lock Manager - one async mutex per row
// ============================================================================
//
// A transaction holds `RowLock` guards for every row it has locked. Dropping
// the guard (commit, rollback or drop of the transaction) releases the row.
// Waiters are served in FIFO order by the tokio mutex.
//
// The table only tracks rows that are held or waited on: the last guard to
// go removes its entry.
//
// ============================================================================

type RowTable = DashMap<RecordKey, Arc<Mutex<()>>>;

#[derive(Default)]
pub struct LockManager {
    rows: Arc<RowTable>,
}

/// Exclusive hold on one row
#[derive(Debug)]
pub struct RowLock {
    key: RecordKey,
    guard: Option<OwnedMutexGuard<()>>,
    rows: Arc<RowTable>,
}

impl RowLock {
    pub fn key(&self) -> RecordKey {
        self.key
    }
}

impl Drop for RowLock {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold their own clone of the mutex, so a count of one means
        // the table is the only owner left. The check runs under the shard
        // lock `acquire` clones under.
        self.rows
            .remove_if(&self.key, |_, row| Arc::strong_count(row) == 1);
    }
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the row is free, then hold it
    pub async fn acquire(&self, key: RecordKey, tx_id: Uuid) -> RowLock {
        let row = self.rows.entry(key).or_default().clone();

        let guard = match row.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::debug!(tx_id = %tx_id, row = %key, "Waiting for row lock");
                let started = Instant::now();
                let guard = row.lock_owned().await;
                tracing::debug!(
                    tx_id = %tx_id,
                    row = %key,
                    waited_ms = started.elapsed().as_millis() as u64,
                    "Row lock granted"
                );
                guard
            }
        };

        RowLock {
            key,
            guard: Some(guard),
            rows: self.rows.clone(),
        }
    }

    /// Whether some transaction currently holds the row
    pub fn is_locked(&self, key: RecordKey) -> bool {
        self.rows
            .get(&key)
            .map(|row| row.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Rows currently held or waited on
    pub fn tracked_rows(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ResourceKind;
    use std::time::Duration;

    fn key(id: i64) -> RecordKey {
        RecordKey::new(ResourceKind::Doctor, id)
    }

    #[tokio::test]
    async fn test_second_acquire_blocks_until_release() {
        let locks = Arc::new(LockManager::new());
        let first = locks.acquire(key(1), Uuid::new_v4()).await;
        assert!(locks.is_locked(key(1)));

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(key(1), Uuid::new_v4()).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be granted the lock")
            .unwrap();
        assert_eq!(second.key(), key(1));
    }

    #[tokio::test]
    async fn test_released_rows_leave_the_table() {
        let locks = Arc::new(LockManager::new());
        let first = locks.acquire(key(1), Uuid::new_v4()).await;
        assert_eq!(locks.tracked_rows(), 1);

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(key(1), Uuid::new_v4()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Entry survives while someone is queued on it
        drop(first);
        let second = waiter.await.unwrap();
        assert_eq!(locks.tracked_rows(), 1);
        assert!(locks.is_locked(key(1)));

        drop(second);
        assert_eq!(locks.tracked_rows(), 0);
        assert!(!locks.is_locked(key(1)));

        for id in 0..16 {
            drop(locks.acquire(key(id), Uuid::new_v4()).await);
        }
        assert_eq!(locks.tracked_rows(), 0);
    }

    #[tokio::test]
    async fn test_distinct_rows_do_not_contend() {
        let locks = LockManager::new();
        let _a = locks.acquire(key(1), Uuid::new_v4()).await;

        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(key(2), Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert!(!locks.is_locked(key(3)));
    }
}
