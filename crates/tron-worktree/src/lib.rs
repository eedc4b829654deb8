//! # tron-worktree
//!
//! Git working directories for concurrent agent sessions.
//!
//! - **Executor**: [`GitExecutor`], bounded `git` invocations with per-repo locks
//! - **Policy**: [`should_isolate`], shared main checkout or private worktree
//! - **Lifecycle / merge / recovery**: worktree creation and teardown, branch
//!   merges with abort-on-conflict, orphan reconciliation
//! - **Coordinator**: [`WorktreeCoordinator`], the per-session acquire/release API
//! - **Sinks**: [`WorktreeEventSink`] routes lifecycle events into the event store

#![deny(unsafe_code)]

pub mod coordinator;
pub mod errors;
pub mod git;
pub mod isolation;
pub mod lifecycle;
pub mod merge;
pub mod recovery;
pub mod sink;
pub mod types;

#[cfg(test)]
mod test_support;

pub use coordinator::WorktreeCoordinator;
pub use errors::{Result, WorktreeError};
pub use git::{GitExecutor, GitOutput};
pub use isolation::{IsolationOptions, should_isolate};
pub use sink::{ChannelSink, EventStoreSink, NoopSink, WorktreeEvent, WorktreeEventSink};
pub use types::{
    AcquireOptions, CommitInfo, GitWorktreeEntry, MergeResult, NO_BRANCH, RecoveryResult,
    ReleaseOptions, WorkingDirectory, WorktreeStatus,
};
