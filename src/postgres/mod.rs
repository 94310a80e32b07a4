// PostgreSQL driver plumbing.
//
// - manager: bb8 connection manager and dedicated connections
// - connection: pooled-or-dedicated client wrapper
// - decode: interval and raw fallbacks for column decoding
// - params: parameter conversion from `RowValues`
// - query: statement execution and result extraction

pub mod connection;
pub mod decode;
pub mod manager;
pub mod params;
pub mod query;

pub use connection::EngineConnection;
pub use decode::PgInterval;
pub use manager::PgManager;
pub use params::Params;
pub use query::build_result_set_from_statement;
