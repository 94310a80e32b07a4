//! Transactions scoped to an async closure, savepoints, and atomic batches.
//!
//! The open transaction is tracked per engine in a task-local map, so any
//! query issued through the engine while the closure runs goes to the
//! transaction's connection.

mod atomic;
mod savepoint;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::runtime::Handle;
use tokio::sync::Mutex;

use crate::error::EngineError;
use crate::postgres::EngineConnection;
use crate::postgres::query::{fetch_on_client, simple_on_client};
use crate::results::ResultSet;
use crate::types::RowValues;

pub use atomic::{Atomic, Statement};
pub use savepoint::{Savepoint, validate_savepoint_name};

tokio::task_local! {
    static CURRENT_TRANSACTIONS: HashMap<u64, PgTransaction>;
}

/// The transaction open for `engine_id` in the current task scope, if any.
pub(crate) fn current_for(engine_id: u64) -> Option<PgTransaction> {
    CURRENT_TRANSACTIONS
        .try_with(|map| map.get(&engine_id).cloned())
        .ok()
        .flatten()
}

/// Run `fut` with `tx` registered as the current transaction of its engine.
pub(crate) async fn scope<F: Future>(tx: PgTransaction, fut: F) -> F::Output {
    let mut map = CURRENT_TRANSACTIONS
        .try_with(Clone::clone)
        .unwrap_or_default();
    map.insert(tx.inner.engine_id, tx);
    CURRENT_TRANSACTIONS.scope(map, fut).await
}

/// Handle to an open transaction. Clones share the same connection and state.
#[derive(Clone)]
pub struct PgTransaction {
    inner: Arc<TxInner>,
}

struct TxInner {
    engine_id: u64,
    conn: Mutex<Option<EngineConnection>>,
    committed: AtomicBool,
    rolled_back: AtomicBool,
    savepoint_id: AtomicU32,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction")
            .field("engine_id", &self.inner.engine_id)
            .field("committed", &self.is_committed())
            .field("rolled_back", &self.is_rolled_back())
            .finish_non_exhaustive()
    }
}

impl PgTransaction {
    /// Issue `BEGIN` on `conn` and wrap it.
    pub(crate) async fn begin(engine_id: u64, conn: EngineConnection) -> Result<Self, EngineError> {
        conn.simple_query("BEGIN")
            .await
            .map_err(|e| EngineError::TransactionError(format!("postgres begin error: {e}")))?;
        Ok(Self {
            inner: Arc::new(TxInner {
                engine_id,
                conn: Mutex::new(Some(conn)),
                committed: AtomicBool::new(false),
                rolled_back: AtomicBool::new(false),
                savepoint_id: AtomicU32::new(0),
            }),
        })
    }

    /// Commit the transaction.
    ///
    /// # Errors
    /// Returns `EngineError::TransactionError` if the commit fails.
    pub async fn commit(&self) -> Result<(), EngineError> {
        self.finish("COMMIT", "commit").await?;
        self.inner.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Roll back the transaction.
    ///
    /// # Errors
    /// Returns `EngineError::TransactionError` if the rollback fails.
    pub async fn rollback(&self) -> Result<(), EngineError> {
        self.finish("ROLLBACK", "rollback").await?;
        self.inner.rolled_back.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn finish(&self, sql: &str, action: &str) -> Result<(), EngineError> {
        let guard = self.inner.conn.lock().await;
        let conn = connection(&guard)?;
        conn.simple_query(sql)
            .await
            .map_err(|e| EngineError::TransactionError(format!("postgres {action} error: {e}")))?;
        Ok(())
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.inner.committed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_rolled_back(&self) -> bool {
        self.inner.rolled_back.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.is_committed() || self.is_rolled_back()
    }

    /// Next number for an unnamed savepoint, starting at 1.
    pub fn get_savepoint_id(&self) -> u32 {
        self.inner.savepoint_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Create a savepoint, named `savepoint_<n>` when no name is given.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSavepointName` for names outside
    /// `[a-zA-Z0-9_]`, or the driver error if the statement fails.
    pub async fn savepoint(&self, name: Option<&str>) -> Result<Savepoint, EngineError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => format!("savepoint_{}", self.get_savepoint_id()),
        };
        validate_savepoint_name(&name)?;
        self.simple(&format!("SAVEPOINT {name}")).await?;
        Ok(Savepoint::new(name, self.clone()))
    }

    /// Roll back to a savepoint by name.
    ///
    /// # Errors
    /// Returns `EngineError::InvalidSavepointName` or the driver error.
    pub async fn rollback_to(&self, savepoint_name: &str) -> Result<(), EngineError> {
        Savepoint::new(savepoint_name.to_string(), self.clone())
            .rollback_to()
            .await
    }

    /// Run a parameterised statement on the transaction's connection.
    pub(crate) async fn fetch(
        &self,
        query: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, EngineError> {
        let guard = self.inner.conn.lock().await;
        fetch_on_client(connection(&guard)?, query, params).await
    }

    /// Run statements over the simple protocol on the transaction's connection.
    pub(crate) async fn simple(&self, sql: &str) -> Result<ResultSet, EngineError> {
        let guard = self.inner.conn.lock().await;
        simple_on_client(connection(&guard)?, sql).await
    }
}

fn connection(slot: &Option<EngineConnection>) -> Result<&EngineConnection, EngineError> {
    slot.as_ref().ok_or_else(|| {
        EngineError::TransactionError("transaction connection already released".into())
    })
}

// A transaction abandoned mid-flight (e.g. its future was cancelled) must not
// hand a connection with an open transaction back to the pool.
impl Drop for TxInner {
    fn drop(&mut self) {
        let finished =
            self.committed.load(Ordering::SeqCst) || self.rolled_back.load(Ordering::SeqCst);
        if !finished
            && let Some(conn) = self.conn.get_mut().take()
            && let Ok(handle) = Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(e) = conn.simple_query("ROLLBACK").await {
                    tracing::debug!("rollback of abandoned transaction failed: {e}");
                }
            });
        }
    }
}
