//! Convenient imports for common functionality.

pub use crate::batch::AsyncBatch;
pub use crate::config::{ConnectionConfig, PoolOptions};
pub use crate::engine::{Engine, EngineOptions, PgEngine};
pub use crate::error::EngineError;
pub use crate::querystring::{QueryArg, QueryString};
pub use crate::results::{CustomDbRow, ResultSet};
pub use crate::transaction::{Atomic, PgTransaction, Savepoint, Statement};
pub use crate::types::RowValues;
