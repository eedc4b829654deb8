//! Error types for worktree coordination.
//!
//! Only setup paths return [`WorktreeError`]. Release and recovery are best
//! effort: their failures are logged or recorded per entry, and merge
//! conflicts are a [`MergeResult`](crate::MergeResult), not an error.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by git execution and worktree setup.
#[derive(Debug, Error)]
pub enum WorktreeError {
    /// The path is not inside a git working tree.
    #[error("not a git repository: {}", .0.display())]
    NotAGitRepository(PathBuf),

    /// Git exited non-zero where success was required.
    #[error("git {command} failed (exit {exit_code:?}): {stderr}")]
    GitCommandFailed {
        /// Arguments, space-joined.
        command: String,
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Trimmed stderr.
        stderr: String,
    },

    /// Git did not finish within the configured bound. The child is killed.
    #[error("git {command} timed out after {timeout_ms}ms")]
    Timeout {
        /// Arguments, space-joined.
        command: String,
        /// Bound that was exceeded.
        timeout_ms: u64,
    },

    /// Spawning git or touching the filesystem failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A checkout already exists at the worktree path on another branch.
    #[error("worktree path {} is already checked out on '{branch}'", .path.display())]
    PathInUse {
        /// Worktree path.
        path: PathBuf,
        /// Branch found there.
        branch: String,
    },

    /// The session holds no working directory.
    #[error("session has no active working directory: {0}")]
    SessionNotActive(String),
}

impl WorktreeError {
    /// Whether retrying may help: another git process holding `index.lock`
    /// or a ref lock.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::GitCommandFailed { stderr, .. } => {
                stderr.contains("index.lock")
                    || stderr.contains("cannot lock ref")
                    || (stderr.contains("Unable to create") && stderr.contains(".lock"))
            }
            Self::Timeout { .. } => true,
            _ => false,
        }
    }
}

/// Convenience type alias for worktree results.
pub type Result<T> = std::result::Result<T, WorktreeError>;
