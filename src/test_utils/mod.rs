//! Helpers for integration tests that need a real server.

/// Test utilities for `PostgreSQL`
pub mod postgres;

pub use postgres::*;
