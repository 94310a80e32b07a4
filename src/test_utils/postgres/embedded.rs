use postgresql_embedded::PostgreSQL;

use crate::config::ConnectionConfig;
use crate::engine::{EngineOptions, PgEngine};
use crate::postgres::EngineConnection;

/// A running embedded `PostgreSQL` instance.
pub struct EmbeddedPostgres {
    pub postgresql: PostgreSQL,
    /// Connection settings for the database created at startup
    pub config: ConnectionConfig,
}

impl EmbeddedPostgres {
    /// Start a server and create `database` on it.
    ///
    /// # Errors
    /// Returns an error if the server cannot be set up or started, the database
    /// cannot be created, or the post-start connectivity check fails.
    pub async fn start(database: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let mut postgresql = PostgreSQL::default();
        postgresql.setup().await?;
        postgresql.start().await?;
        postgresql.create_database(database).await?;

        let settings = postgresql.settings();
        let config = ConnectionConfig {
            host: settings.host.clone(),
            port: settings.port,
            user: settings.username.clone(),
            password: settings.password.clone(),
            database: database.to_string(),
            dsn: None,
        };

        let conn = EngineConnection::open(&config.to_tokio_config()?).await?;
        conn.simple_query("SELECT 1").await?;
        tracing::debug!(port = config.port, database, "embedded postgres started");

        Ok(Self { postgresql, config })
    }

    /// Engine for the embedded database. Extensions are skipped, since the
    /// bundled server may not ship them.
    #[must_use]
    pub fn engine(&self) -> PgEngine {
        self.engine_with(EngineOptions::default().with_extensions(Vec::<String>::new()))
    }

    #[must_use]
    pub fn engine_with(&self, options: EngineOptions) -> PgEngine {
        PgEngine::with_options(self.config.clone(), options)
    }

    /// Stop the server.
    pub async fn stop(self) {
        let _ = self.postgresql.stop().await;
    }
}
