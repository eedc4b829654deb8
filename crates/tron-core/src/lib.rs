//! # tron-core
//!
//! Shared vocabulary for the Tron session crates:
//!
//! - **Branded IDs**: `EventId`, `SessionId`, `WorkspaceId` as newtypes for type safety
//! - **Logging**: one-call `tracing` subscriber setup
//! - **Retry**: backoff configuration and delay math used by the store and git layers

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod retry;

pub use ids::{EventId, SessionId, WorkspaceId};
