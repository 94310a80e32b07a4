use std::future::Future;

use bb8::{ManageConnection, Pool};
use tokio_postgres::{Client, NoTls};

use crate::config::PoolOptions;
use crate::error::EngineError;

/// bb8 manager for Postgres clients.
#[derive(Debug, Clone)]
pub struct PgManager {
    pub(crate) config: tokio_postgres::Config,
}

impl PgManager {
    #[must_use]
    pub fn new(config: tokio_postgres::Config) -> Self {
        Self { config }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `EngineError::ConnectionError` if pool creation fails.
    pub async fn build_pool(self, options: &PoolOptions) -> Result<Pool<PgManager>, EngineError> {
        let mut builder = Pool::builder()
            .max_size(options.max_size)
            .min_idle(options.min_idle);
        if let Some(timeout) = options.connection_timeout {
            builder = builder.connection_timeout(timeout);
        }
        builder
            .build(self)
            .await
            .map_err(|e| EngineError::ConnectionError(format!("postgres pool error: {e}")))
    }
}

/// Open a client outside any pool and drive its connection on the runtime.
pub(crate) async fn connect(
    config: &tokio_postgres::Config,
) -> Result<Client, tokio_postgres::Error> {
    tracing::debug!(
        hosts = ?config.get_hosts(),
        db = ?config.get_dbname(),
        user = ?config.get_user(),
        "postgres connect start"
    );
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::debug!("postgres connection closed with error: {e}");
        }
    });
    Ok(client)
}

impl ManageConnection for PgManager {
    type Connection = Client;
    type Error = tokio_postgres::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let cfg = self.config.clone();
        async move { connect(&cfg).await }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        async move { conn.simple_query("SELECT 1").await.map(|_| ()) }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_closed()
    }
}
