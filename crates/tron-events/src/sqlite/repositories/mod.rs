//! Stateless repositories over the `SQLite` tables.
//!
//! Every method takes a `&Connection`, so the store decides transaction
//! boundaries and each repository is testable against a bare connection.

pub mod event;
pub mod search;
pub mod session;
pub mod workspace;
