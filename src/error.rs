use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    PostgresError(#[from] tokio_postgres::Error),

    #[error(transparent)]
    PoolError(#[from] bb8::RunError<tokio_postgres::Error>),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("postgres connect error: {0}")]
    ConnectFailed(#[source] tokio_postgres::Error),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Invalid savepoint name {0:?}: use only alphanumeric and underscore characters")]
    InvalidSavepointName(String),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("A pool isn't currently running.")]
    NoPool,

    #[error("Unable to parse server version {0:?}")]
    VersionParse(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl EngineError {
    /// True when the server could not be reached at all.
    ///
    /// A server that answered with an error (bad password, missing database)
    /// was reached, so those don't count.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        match self {
            EngineError::ConnectFailed(e) | EngineError::PoolError(bb8::RunError::User(e)) => {
                e.as_db_error().is_none()
            }
            EngineError::PoolError(bb8::RunError::TimedOut) => true,
            _ => false,
        }
    }
}
