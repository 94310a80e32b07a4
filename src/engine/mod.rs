//! The engine plugin contract and its PostgreSQL implementation.

mod pg;
mod version;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::batch::AsyncBatch;
use crate::config::PoolOptions;
use crate::error::EngineError;
use crate::querystring::QueryString;
use crate::results::ResultSet;

pub use pg::PgEngine;
pub use version::parse_raw_version_string;

/// What the query layer needs from a database engine.
#[async_trait]
pub trait Engine: Send + Sync {
    fn engine_type(&self) -> &'static str;

    fn min_version_number(&self) -> f64;

    /// Server version as `major.minor`, or `0.0` when the server is unreachable.
    async fn get_version(&self) -> Result<f64, EngineError>;

    /// Fetch the server version and warn when it is older than supported.
    async fn check_version(&self) -> Result<f64, EngineError> {
        let version = self.get_version().await?;
        if version < self.min_version_number() {
            tracing::warn!(
                engine = self.engine_type(),
                "This engine requires version {} or above, you have {}",
                self.min_version_number(),
                version
            );
        }
        Ok(version)
    }

    async fn prep_database(&self) -> Result<(), EngineError>;

    async fn start_connection_pool(&self, options: PoolOptions) -> Result<(), EngineError>;

    async fn close_connection_pool(&self) -> Result<(), EngineError>;

    async fn run_querystring(
        &self,
        querystring: &QueryString,
        in_pool: bool,
    ) -> Result<ResultSet, EngineError>;

    async fn run_ddl(&self, ddl: &str, in_pool: bool) -> Result<ResultSet, EngineError>;

    /// Open a cursor over `querystring` that yields `batch_size` rows at a time.
    async fn open_batch(
        &self,
        querystring: &QueryString,
        batch_size: usize,
    ) -> Result<AsyncBatch, EngineError>;

    fn transaction_exists(&self) -> bool;
}

/// Engine settings beyond the connection config.
#[derive(Clone)]
pub struct EngineOptions {
    /// Extensions created by `prep_database`. Empty for read-only databases.
    pub extensions: Vec<String>,
    /// Log each statement before it runs.
    pub log_queries: bool,
    /// Log each result after it returns.
    pub log_responses: bool,
    /// Named secondary engines, e.g. read replicas.
    pub extra_nodes: HashMap<String, Arc<dyn Engine>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["uuid-ossp".to_string()],
            log_queries: false,
            log_responses: false,
            extra_nodes: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut nodes: Vec<&String> = self.extra_nodes.keys().collect();
        nodes.sort();
        f.debug_struct("EngineOptions")
            .field("extensions", &self.extensions)
            .field("log_queries", &self.log_queries)
            .field("log_responses", &self.log_responses)
            .field("extra_nodes", &nodes)
            .finish()
    }
}

impl EngineOptions {
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_log_queries(mut self, log_queries: bool) -> Self {
        self.log_queries = log_queries;
        self
    }

    #[must_use]
    pub fn with_log_responses(mut self, log_responses: bool) -> Self {
        self.log_responses = log_responses;
        self
    }

    #[must_use]
    pub fn with_extra_node(mut self, name: impl Into<String>, node: Arc<dyn Engine>) -> Self {
        self.extra_nodes.insert(name.into(), node);
        self
    }
}

/// Drive `fut` to completion from blocking code on a private runtime.
///
/// # Errors
/// Returns `EngineError::Other` when called from inside a tokio runtime or when
/// the runtime cannot be built.
pub fn run_sync<F: Future>(fut: F) -> Result<F::Output, EngineError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(EngineError::Other(
            "run_sync called from inside an async runtime; await the async variant instead"
                .to_string(),
        ));
    }
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| EngineError::Other(format!("failed to build runtime: {e}")))?;
    Ok(rt.block_on(fut))
}
