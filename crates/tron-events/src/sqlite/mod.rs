//! `SQLite` backend for the event store.
//!
//! - **[`connection`]**: `r2d2` pool with WAL mode and foreign keys on every connection.
//! - **[`migrations`]**: version-tracked schema evolution, embedded at compile time.
//! - **[`row_types`]**: raw row structs for `rusqlite` mapping.
//! - **[`repositories`]**: stateless repositories; every method takes `&Connection`.

pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod row_types;

pub use connection::{
    new_file, new_in_memory, verify_pragmas, ConnectionConfig, ConnectionPool, PooledConnection,
    PragmaState,
};
pub use migrations::{current_version, latest_version, run_migrations};
