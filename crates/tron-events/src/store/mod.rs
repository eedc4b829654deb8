//! The [`EventStore`]: session-centric reads and writes over the repositories.
//!
//! Every write runs in one `IMMEDIATE` transaction, so callers never observe
//! a half-applied append, fork or rewind.

mod event_store;

pub use event_store::*;
