//! # tron-events
//!
//! Append-only, per-session event log on `SQLite`, and the pure projection
//! that turns a log into conversation state.
//!
//! - **Types**: [`SessionEvent`] with a closed [`EventType`] table and typed payloads
//! - **Store**: [`EventStore`] with append, fork, rewind and point-in-time reconstruction
//! - **`SQLite` backend**: WAL pool, versioned migrations, stateless repositories
//! - **Reconstruction**: [`reconstruct_session`], a deterministic fold over an ancestor chain

#![deny(unsafe_code)]

pub mod errors;
pub mod reconstruct;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{EventStoreError, Result};
pub use reconstruct::reconstruct_session;
pub use sqlite::repositories::event::EventRange;
pub use sqlite::repositories::search::SearchOptions;
pub use sqlite::repositories::session::ListSessionsOptions;
pub use store::{AppendOptions, CreateSessionResult, EventStore, ForkOptions, ForkResult};
pub use types::{
    EventType, Message, MessageWithEventId, SearchResult, Session, SessionEvent,
    SessionMetadata, SessionSummary, TokenUsage, Workspace, WorktreeState,
};
