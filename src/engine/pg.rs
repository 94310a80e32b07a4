use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bb8::Pool;
use tokio::sync::RwLock;
use tokio_postgres::Client;

use super::{Engine, EngineOptions, parse_raw_version_string, run_sync};
use crate::batch::AsyncBatch;
use crate::config::{ConnectionConfig, PoolOptions};
use crate::error::EngineError;
use crate::postgres::query::{fetch_on_client, simple_on_client};
use crate::postgres::{EngineConnection, PgManager};
use crate::querystring::QueryString;
use crate::results::ResultSet;
use crate::transaction::{self, Atomic, PgTransaction};
use crate::types::RowValues;

static NEXT_ENGINE_ID: AtomicU64 = AtomicU64::new(1);

/// PostgreSQL engine handle.
///
/// Construction only stores the configuration; nothing connects until the
/// first query, pool start, or version check. Clones share the pool and the
/// query counter.
///
/// ```rust,no_run
/// use pg_orm_engine::prelude::*;
///
/// # async fn demo() -> Result<(), EngineError> {
/// let engine = PgEngine::new(ConnectionConfig::from_env()?);
/// engine.start_connection_pool(PoolOptions::default()).await?;
/// let rs = engine
///     .run_querystring(&QueryString::raw("SELECT * FROM users WHERE id = {}").arg(3), true)
///     .await?;
/// # let _ = rs;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    id: u64,
    config: ConnectionConfig,
    options: EngineOptions,
    pool: RwLock<Option<Pool<PgManager>>>,
    query_id: AtomicU64,
}

impl std::fmt::Debug for PgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgEngine")
            .field("id", &self.inner.id)
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("database", &self.inner.config.database)
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// A statement on its way to a connection.
#[derive(Clone, Copy)]
enum Request<'a> {
    Query { sql: &'a str, args: &'a [RowValues] },
    Ddl(&'a str),
}

impl Request<'_> {
    async fn run_on(self, client: &Client) -> Result<ResultSet, EngineError> {
        match self {
            Request::Query { sql, args } => fetch_on_client(client, sql, args).await,
            Request::Ddl(sql) => simple_on_client(client, sql).await,
        }
    }

    async fn run_in(self, tx: &PgTransaction) -> Result<ResultSet, EngineError> {
        match self {
            Request::Query { sql, args } => tx.fetch(sql, args).await,
            Request::Ddl(sql) => tx.simple(sql).await,
        }
    }
}

impl PgEngine {
    pub const ENGINE_TYPE: &'static str = "postgres";
    pub const MIN_VERSION_NUMBER: f64 = 10.0;

    /// Wrap `config` with default engine options.
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_options(config, EngineOptions::default())
    }

    #[must_use]
    pub fn with_options(config: ConnectionConfig, options: EngineOptions) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                id: NEXT_ENGINE_ID.fetch_add(1, Ordering::Relaxed),
                config,
                options,
                pool: RwLock::new(None),
                query_id: AtomicU64::new(0),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Next query id for log correlation.
    pub fn get_query_id(&self) -> u64 {
        self.inner.query_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn print_query(&self, query_id: u64, query: &str) {
        tracing::info!(
            database = %self.inner.config.database,
            query_id,
            "{query}"
        );
    }

    fn print_response(&self, query_id: u64, response: &ResultSet) {
        let rows = serde_json::Value::Array(response.to_json_rows());
        tracing::info!(
            database = %self.inner.config.database,
            query_id,
            "{rows}"
        );
    }

    /// The named extra node.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownNode` if no node has that name.
    pub fn node(&self, name: &str) -> Result<&Arc<dyn Engine>, EngineError> {
        self.inner
            .options
            .extra_nodes
            .get(name)
            .ok_or_else(|| EngineError::UnknownNode(name.to_string()))
    }

    async fn current_pool(&self) -> Option<Pool<PgManager>> {
        self.inner.pool.read().await.clone()
    }

    /// Whether a connection pool is running.
    pub async fn has_pool(&self) -> bool {
        self.inner.pool.read().await.is_some()
    }

    /// Start a connection pool. A pool that is already running is kept.
    ///
    /// # Errors
    /// Returns `EngineError::ConfigError` for an unusable config or
    /// `EngineError::ConnectionError` if the pool cannot be built.
    pub async fn start_connection_pool(&self, options: PoolOptions) -> Result<(), EngineError> {
        let mut pool = self.inner.pool.write().await;
        if pool.is_some() {
            tracing::warn!(
                "A pool already exists - close it first if you want to create a new pool."
            );
            return Ok(());
        }

        let config = self.inner.config.to_tokio_config()?;
        *pool = Some(PgManager::new(config).build_pool(&options).await?);
        tracing::debug!(max_size = options.max_size, "postgres pool started");
        Ok(())
    }

    /// Close the running connection pool.
    ///
    /// # Errors
    /// Currently never fails; kept fallible to match the engine contract.
    pub async fn close_connection_pool(&self) -> Result<(), EngineError> {
        if self.inner.pool.write().await.take().is_none() {
            tracing::warn!("No pool is running.");
        }
        Ok(())
    }

    /// # Errors
    /// See [`PgEngine::start_connection_pool`].
    #[deprecated(note = "`start_connnection_pool` is a typo - use `start_connection_pool`")]
    pub async fn start_connnection_pool(&self, options: PoolOptions) -> Result<(), EngineError> {
        tracing::warn!(
            "`start_connnection_pool` is a typo - please change it to `start_connection_pool`."
        );
        self.start_connection_pool(options).await
    }

    /// # Errors
    /// See [`PgEngine::close_connection_pool`].
    #[deprecated(note = "`close_connnection_pool` is a typo - use `close_connection_pool`")]
    pub async fn close_connnection_pool(&self) -> Result<(), EngineError> {
        tracing::warn!(
            "`close_connnection_pool` is a typo - please change it to `close_connection_pool`."
        );
        self.close_connection_pool().await
    }

    /// A connection from the pool when one is running, otherwise a fresh one.
    ///
    /// # Errors
    /// Returns `EngineError::ConnectFailed` or `EngineError::PoolError` if no
    /// connection can be made.
    pub async fn get_new_connection(&self) -> Result<EngineConnection, EngineError> {
        if let Some(pool) = self.current_pool().await {
            return EngineConnection::from_pool(&pool).await;
        }
        EngineConnection::open(&self.inner.config.to_tokio_config()?).await
    }

    async fn run_in_pool(&self, request: Request<'_>) -> Result<ResultSet, EngineError> {
        let pool = self.current_pool().await.ok_or(EngineError::NoPool)?;
        let conn = EngineConnection::from_pool(&pool).await?;
        request.run_on(&conn).await
    }

    async fn run_in_new_connection(&self, request: Request<'_>) -> Result<ResultSet, EngineError> {
        let conn = EngineConnection::open(&self.inner.config.to_tokio_config()?).await?;
        request.run_on(&conn).await
    }

    async fn dispatch(
        &self,
        request: Request<'_>,
        display: &str,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError> {
        let query_id = self.get_query_id();
        if self.inner.options.log_queries {
            self.print_query(query_id, display);
        }

        let response = if let Some(tx) = self.current_transaction() {
            request.run_in(&tx).await?
        } else if in_pool && self.has_pool().await {
            self.run_in_pool(request).await?
        } else {
            self.run_in_new_connection(request).await?
        };

        if self.inner.options.log_responses {
            self.print_response(query_id, &response);
        }
        Ok(response)
    }

    /// Compile and run a query string.
    ///
    /// Inside a transaction scope the query runs on the transaction's
    /// connection; otherwise on the pool (when `in_pool` and one is running)
    /// or a fresh connection.
    ///
    /// # Errors
    /// Returns compilation, connection, or execution errors.
    pub async fn run_querystring(
        &self,
        querystring: &QueryString,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError> {
        let (sql, args) = querystring.compile_string()?;
        let display = querystring.to_string();
        self.dispatch(Request::Query { sql: &sql, args: &args }, &display, in_pool)
            .await
    }

    /// Run DDL (or any unparameterised SQL, possibly several statements).
    ///
    /// # Errors
    /// Returns connection or execution errors.
    pub async fn run_ddl(&self, ddl: &str, in_pool: bool) -> Result<ResultSet, EngineError> {
        self.dispatch(Request::Ddl(ddl), ddl, in_pool).await
    }

    /// [`PgEngine::run_querystring`] on an extra node, or on this engine for `None`.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownNode` for an unknown node name.
    pub async fn run_querystring_on(
        &self,
        node: Option<&str>,
        querystring: &QueryString,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError> {
        match node {
            Some(name) => self.node(name)?.run_querystring(querystring, in_pool).await,
            None => self.run_querystring(querystring, in_pool).await,
        }
    }

    /// [`PgEngine::run_ddl`] on an extra node, or on this engine for `None`.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownNode` for an unknown node name.
    pub async fn run_ddl_on(
        &self,
        node: Option<&str>,
        ddl: &str,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError> {
        match node {
            Some(name) => self.node(name)?.run_ddl(ddl, in_pool).await,
            None => self.run_ddl(ddl, in_pool).await,
        }
    }

    /// Read the results of `querystring` in chunks of `batch_size` rows.
    ///
    /// # Errors
    /// Returns `EngineError::UnknownNode`, connection, or cursor errors.
    pub async fn batch(
        &self,
        querystring: &QueryString,
        batch_size: usize,
        node: Option<&str>,
    ) -> Result<AsyncBatch, EngineError> {
        match node {
            Some(name) => self.node(name)?.open_batch(querystring, batch_size).await,
            None => {
                let conn = self.get_new_connection().await?;
                AsyncBatch::open(conn, querystring, batch_size).await
            }
        }
    }

    /// Server version as `major.minor`.
    ///
    /// An unreachable server is not an error here: a warning is logged and
    /// `0.0` returned. A server that answers but rejects the connection
    /// (bad credentials, missing database) is.
    ///
    /// # Errors
    /// Returns `EngineError::ConnectFailed` for a rejected connection,
    /// execution errors, or `EngineError::VersionParse`.
    pub async fn get_version(&self) -> Result<f64, EngineError> {
        let response = match self
            .run_in_new_connection(Request::Ddl("SHOW server_version"))
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_connection_failure() => {
                tracing::warn!("Unable to connect to database - {e}");
                return Ok(0.0);
            }
            Err(e) => return Err(e),
        };

        let version_string = response
            .results
            .first()
            .and_then(|row| row.get("server_version"))
            .and_then(RowValues::as_text)
            .ok_or_else(|| EngineError::VersionParse(String::new()))?;
        parse_raw_version_string(version_string)
    }

    /// Blocking variant of [`PgEngine::get_version`].
    ///
    /// # Errors
    /// Same as [`PgEngine::get_version`], plus an error when called inside a runtime.
    pub fn get_version_sync(&self) -> Result<f64, EngineError> {
        run_sync(self.get_version())?
    }

    /// Create each configured extension. Failures are logged and skipped.
    ///
    /// # Errors
    /// Currently never fails; kept fallible to match the engine contract.
    pub async fn prep_database(&self) -> Result<(), EngineError> {
        for extension in &self.inner.options.extensions {
            let ddl = format!("CREATE EXTENSION IF NOT EXISTS \"{extension}\"");
            if let Err(e) = self.run_in_new_connection(Request::Ddl(&ddl)).await {
                tracing::warn!(
                    "=> Unable to create {extension} extension - some functionality may not \
                     behave as expected. Make sure your database user has permission to create \
                     extensions, or add it manually using `CREATE EXTENSION \"{extension}\";` ({e})"
                );
            }
        }
        Ok(())
    }

    /// The transaction open for this engine in the current task scope.
    #[must_use]
    pub fn current_transaction(&self) -> Option<PgTransaction> {
        transaction::current_for(self.id())
    }

    #[must_use]
    pub fn transaction_exists(&self) -> bool {
        self.current_transaction().is_some()
    }

    /// Run `f` inside a transaction.
    ///
    /// When this engine already has a transaction open in the current scope,
    /// `f` joins it if `allow_nested` is set, and fails otherwise. A new
    /// transaction commits when `f` returns `Ok` and rolls back when it returns
    /// `Err`, unless `f` already committed or rolled back by hand.
    ///
    /// ```rust,no_run
    /// # use pg_orm_engine::prelude::*;
    /// # async fn demo(engine: &PgEngine) -> Result<(), EngineError> {
    /// engine
    ///     .transaction(true, |tx| async move {
    ///         let insert = QueryString::raw("INSERT INTO manager (name) VALUES ({})").arg("Bob");
    ///         engine.run_querystring(&insert, true).await?;
    ///         let savepoint = tx.savepoint(None).await?;
    ///         savepoint.release().await?;
    ///         Ok(())
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns `EngineError::TransactionError` for a disallowed nested
    /// transaction or a failed BEGIN/COMMIT, or the error returned by `f`.
    pub async fn transaction<T, F, Fut>(&self, allow_nested: bool, f: F) -> Result<T, EngineError>
    where
        F: FnOnce(PgTransaction) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        if let Some(parent) = self.current_transaction() {
            if !allow_nested {
                return Err(EngineError::TransactionError(
                    "A transaction is already active - nested transactions aren't allowed."
                        .to_string(),
                ));
            }
            return f(parent).await;
        }

        let conn = self.get_new_connection().await?;
        let tx = PgTransaction::begin(self.id(), conn).await?;
        let scoped = tx.clone();
        let outcome = transaction::scope(tx.clone(), async move { f(scoped).await }).await;

        match outcome {
            Ok(value) => {
                if !tx.is_finished() {
                    tx.commit().await?;
                }
                Ok(value)
            }
            Err(err) => {
                if !tx.is_finished()
                    && let Err(rollback_err) = tx.rollback().await
                {
                    tracing::warn!("rollback after failed transaction also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Collect statements to run later in one transaction.
    #[must_use]
    pub fn atomic(&self) -> Atomic {
        Atomic::new(self.clone())
    }
}

#[async_trait]
impl Engine for PgEngine {
    fn engine_type(&self) -> &'static str {
        Self::ENGINE_TYPE
    }

    fn min_version_number(&self) -> f64 {
        Self::MIN_VERSION_NUMBER
    }

    async fn get_version(&self) -> Result<f64, EngineError> {
        PgEngine::get_version(self).await
    }

    async fn prep_database(&self) -> Result<(), EngineError> {
        PgEngine::prep_database(self).await
    }

    async fn start_connection_pool(&self, options: PoolOptions) -> Result<(), EngineError> {
        PgEngine::start_connection_pool(self, options).await
    }

    async fn close_connection_pool(&self) -> Result<(), EngineError> {
        PgEngine::close_connection_pool(self).await
    }

    async fn run_querystring(
        &self,
        querystring: &QueryString,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError> {
        PgEngine::run_querystring(self, querystring, in_pool).await
    }

    async fn run_ddl(&self, ddl: &str, in_pool: bool) -> Result<ResultSet, EngineError> {
        PgEngine::run_ddl(self, ddl, in_pool).await
    }

    async fn open_batch(
        &self,
        querystring: &QueryString,
        batch_size: usize,
    ) -> Result<AsyncBatch, EngineError> {
        PgEngine::batch(self, querystring, batch_size, None).await
    }

    fn transaction_exists(&self) -> bool {
        PgEngine::transaction_exists(self)
    }
}
