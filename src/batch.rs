use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;

use crate::error::EngineError;
use crate::postgres::EngineConnection;
use crate::postgres::query::{execute_on_client, fetch_on_client};
use crate::querystring::QueryString;
use crate::results::ResultSet;

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

/// Server-side cursor over a query, read `batch_size` rows at a time.
///
/// The cursor lives in its own transaction on a dedicated connection. Call
/// [`AsyncBatch::close`] when done; a batch dropped without closing is rolled
/// back in the background.
///
/// ```rust,no_run
/// # use pg_orm_engine::prelude::*;
/// # async fn demo(engine: &PgEngine) -> Result<(), EngineError> {
/// let mut batch = engine.batch(&QueryString::raw("SELECT * FROM band"), 100, None).await?;
/// while let Some(rows) = batch.next().await? {
///     println!("{} rows", rows.len());
/// }
/// batch.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AsyncBatch {
    conn: Option<EngineConnection>,
    cursor: String,
    batch_size: usize,
}

impl AsyncBatch {
    pub(crate) async fn open(
        conn: EngineConnection,
        querystring: &QueryString,
        batch_size: usize,
    ) -> Result<Self, EngineError> {
        if batch_size == 0 {
            return Err(EngineError::ParameterError(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let (sql, args) = querystring.compile_string()?;
        let cursor = format!(
            "batch_cursor_{}",
            NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed)
        );

        conn.simple_query("BEGIN")
            .await
            .map_err(|e| EngineError::TransactionError(format!("postgres begin error: {e}")))?;
        let batch = Self {
            conn: Some(conn),
            cursor,
            batch_size,
        };

        let declare = format!("DECLARE {} NO SCROLL CURSOR FOR {sql}", batch.cursor);
        execute_on_client(batch.connection()?, &declare, &args).await?;
        Ok(batch)
    }

    fn connection(&self) -> Result<&EngineConnection, EngineError> {
        self.conn
            .as_ref()
            .ok_or_else(|| EngineError::ExecutionError("batch already closed".into()))
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The next chunk of rows, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    /// Returns the driver error if the fetch fails.
    pub async fn next(&mut self) -> Result<Option<ResultSet>, EngineError> {
        let fetch = format!("FETCH FORWARD {} FROM {}", self.batch_size, self.cursor);
        let rows = fetch_on_client(self.connection()?, &fetch, &[]).await?;
        if rows.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }

    /// Close the cursor and commit its transaction.
    ///
    /// # Errors
    /// Returns the driver error if the commit fails.
    pub async fn close(mut self) -> Result<(), EngineError> {
        self.finish("COMMIT").await
    }

    /// Discard the cursor and roll back its transaction.
    ///
    /// # Errors
    /// Returns the driver error if the rollback fails.
    pub async fn abort(mut self) -> Result<(), EngineError> {
        self.finish("ROLLBACK").await
    }

    async fn finish(&mut self, sql: &str) -> Result<(), EngineError> {
        if let Some(conn) = self.conn.take() {
            conn.simple_query(sql).await?;
        }
        Ok(())
    }
}

impl Drop for AsyncBatch {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Ok(handle) = Handle::try_current()
        {
            handle.spawn(async move {
                let _ = conn.simple_query("ROLLBACK").await;
            });
        }
    }
}
