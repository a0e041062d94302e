use futures_util::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

use super::{EntityStore, StoreError, Transaction};

// ============================================================================
// Transaction Coordinator - all-or-nothing unit of work
// ============================================================================
//
// `run_atomic` opens a transaction, hands it to the work closure and then:
// - Ok  -> commit (a failed commit is reported as the operation's error)
// - Err -> rollback, discarding every staged write and releasing every lock
//
// The coordinator never looks at what the work did.
//
// ============================================================================

#[derive(Clone)]
pub struct TransactionCoordinator {
    store: Arc<dyn EntityStore>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn run_atomic<T, E, F>(&self, operation: &'static str, work: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut (dyn Transaction + 'static)) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<StoreError> + fmt::Display + Send,
    {
        let mut tx = self.store.begin().await?;
        let tx_id = tx.id();

        tracing::debug!(tx_id = %tx_id, operation, "Transaction started");

        let outcome = work(tx.as_mut()).await;

        match outcome {
            Ok(value) => {
                tx.commit().await?;
                tracing::debug!(tx_id = %tx_id, operation, "Transaction committed");
                Ok(value)
            }
            Err(err) => {
                tracing::debug!(
                    tx_id = %tx_id,
                    operation,
                    error = %err,
                    "Transaction aborted, rolling back"
                );
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        tx_id = %tx_id,
                        operation,
                        error = %rollback_err,
                        "Rollback failed; locks are released when the connection closes"
                    );
                }
                Err(err)
            }
        }
    }
}
