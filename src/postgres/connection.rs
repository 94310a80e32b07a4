use std::ops::Deref;

use bb8::{Pool, PooledConnection};
use tokio_postgres::Client;

use super::manager::{self, PgManager};
use crate::error::EngineError;

/// A client either checked out of the engine's pool or opened just for this use.
pub enum EngineConnection {
    Pooled(PooledConnection<'static, PgManager>),
    Dedicated(Client),
}

impl EngineConnection {
    /// Check a connection out of the pool.
    ///
    /// # Errors
    /// Returns `EngineError::PoolError` if acquiring the connection fails or times out.
    pub async fn from_pool(pool: &Pool<PgManager>) -> Result<Self, EngineError> {
        let conn = pool.get_owned().await?;
        Ok(EngineConnection::Pooled(conn))
    }

    /// Open a dedicated connection that is closed when dropped.
    ///
    /// # Errors
    /// Returns `EngineError::ConnectFailed` carrying the driver error, which
    /// tells an unreachable server apart from one that refused the login.
    pub async fn open(config: &tokio_postgres::Config) -> Result<Self, EngineError> {
        let client = manager::connect(config)
            .await
            .map_err(EngineError::ConnectFailed)?;
        Ok(EngineConnection::Dedicated(client))
    }
}

impl Deref for EngineConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        match self {
            EngineConnection::Pooled(conn) => conn,
            EngineConnection::Dedicated(client) => client,
        }
    }
}

impl std::fmt::Debug for EngineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pooled(_) => f.debug_tuple("Pooled").field(&"<Client>").finish(),
            Self::Dedicated(_) => f.debug_tuple("Dedicated").field(&"<Client>").finish(),
        }
    }
}
