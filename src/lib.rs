//! PostgreSQL engine plugin for ORM query layers.
//!
//! [`PgEngine`] wraps a [`ConnectionConfig`] and implements the [`Engine`]
//! contract on top of `tokio-postgres` and a `bb8` pool: compiled query
//! strings, DDL, transactions with savepoints, atomic batches, cursor reads,
//! version checks, and routing to extra nodes.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod postgres;
pub mod prelude;
pub mod querystring;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use batch::AsyncBatch;
pub use config::{ConnectionConfig, PoolOptions};
pub use engine::{Engine, EngineOptions, PgEngine, parse_raw_version_string};
pub use error::EngineError;
pub use querystring::{QueryArg, QueryString};
pub use results::{CustomDbRow, ResultSet};
pub use transaction::{Atomic, PgTransaction, Savepoint, Statement};
pub use types::RowValues;
