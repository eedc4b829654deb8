//! Handles and results returned by the coordinator.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tron_settings::MergeStrategy;

/// Branch name reported for directories outside version control.
pub const NO_BRANCH: &str = "none";

/// A session's working directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingDirectory {
    /// Owning session.
    pub session_id: String,
    /// Directory the session works in.
    pub path: PathBuf,
    /// `true` for a private worktree, `false` for the shared main directory.
    pub isolated: bool,
    /// Checked-out branch, [`NO_BRANCH`] outside git.
    pub branch: String,
    /// Commit the directory started from. Empty outside git or in a repo
    /// without commits.
    pub base_commit: String,
    /// Repository root, `None` outside git.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_root: Option<PathBuf>,
    /// Session this one was forked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
}

impl WorkingDirectory {
    /// Whether the directory is inside a git repository.
    pub fn is_git_backed(&self) -> bool {
        self.repo_root.is_some()
    }
}

/// Options for [`crate::WorktreeCoordinator::acquire`].
#[derive(Clone, Debug, Default)]
pub struct AcquireOptions {
    /// Isolate even when the lazy policy would share.
    pub force_isolation: bool,
    /// Fork source; forks are always isolated under the lazy policy.
    pub parent_session_id: Option<String>,
    /// Explicit start commit for the new branch.
    pub parent_commit: Option<String>,
}

/// Options for [`crate::WorktreeCoordinator::release`]. `None` falls back to
/// the settings.
#[derive(Clone, Debug, Default)]
pub struct ReleaseOptions {
    /// Message for the auto-commit.
    pub commit_message: Option<String>,
    /// Keep the session branch.
    pub preserve_branch: Option<bool>,
    /// Remove an isolated worktree directory.
    pub delete_worktree: Option<bool>,
}

/// Outcome of merging a session branch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Whether the target branch now contains the session's work.
    pub success: bool,
    /// Resulting commit on the target branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_commit: Option<String>,
    /// Conflicted paths, or an explanation when no merge was attempted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
    /// Strategy used.
    pub strategy: MergeStrategy,
}

impl MergeResult {
    /// A merge that was refused before touching git.
    pub fn refused(reason: impl Into<String>, strategy: MergeStrategy) -> Self {
        Self {
            success: false,
            merge_commit: None,
            conflicts: vec![reason.into()],
            strategy,
        }
    }
}

/// Outcome of recovering one orphaned worktree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    /// Directory name under the base directory.
    pub session_id: String,
    /// Worktree path.
    pub path: PathBuf,
    /// Whether uncommitted changes were found.
    pub had_changes: bool,
    /// Whether they were committed.
    pub committed: bool,
    /// Whether the worktree was removed.
    pub deleted: bool,
    /// First failure for this entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A commit made on behalf of a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// New commit hash.
    pub hash: String,
    /// Commit message.
    pub message: String,
    /// Paths included.
    pub files_changed: Vec<String>,
}

/// Snapshot of a session's working directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeStatus {
    /// The handle.
    pub working_directory: WorkingDirectory,
    /// Whether `git status` reports changes.
    pub has_uncommitted_changes: bool,
    /// Current HEAD, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_commit: Option<String>,
}

/// One entry of `git worktree list --porcelain`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitWorktreeEntry {
    /// Worktree path.
    pub path: PathBuf,
    /// Checked-out commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<String>,
    /// Short branch name, `None` when detached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Bare repository entry.
    pub bare: bool,
    /// Detached HEAD.
    pub detached: bool,
}
