//! # tron-runtime
//!
//! Session orchestration over the event store and the worktree coordinator.
//!
//! - **Session manager**: create, resume, end, fork and rewind sessions
//! - **Workspaces**: acquire, merge and recover session working directories,
//!   with lifecycle events recorded in each session's own log
//! - **Context**: `context.cleared` and externally produced compactions

#![deny(unsafe_code)]

pub mod errors;
pub mod orchestrator;

pub use errors::{Result, RuntimeError};
pub use orchestrator::session_manager::{
    CompactionRecord, ForkSessionResult, SessionFilter, SessionManager,
};
