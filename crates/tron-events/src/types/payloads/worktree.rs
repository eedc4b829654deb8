//! Worktree lifecycle payloads, emitted by the worktree coordinator.

use serde::{Deserialize, Serialize};

/// Payload for `worktree.acquired` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeAcquiredPayload {
    /// Directory the session works in.
    pub path: String,
    /// Branch checked out there (`none` outside git).
    pub branch: String,
    /// Commit the branch started from.
    pub base_commit: String,
    /// Whether the directory is private to the session.
    pub isolated: bool,
    /// Session whose commit the branch was forked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<WorktreeForkSource>,
}

/// Fork origin of an isolated worktree.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeForkSource {
    /// Parent session.
    pub session_id: String,
    /// Parent commit the branch starts at.
    pub commit: String,
}

/// Payload for `worktree.commit` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeCommitPayload {
    /// New commit hash.
    pub commit_hash: String,
    /// Commit message.
    pub message: String,
    /// Paths included in the commit.
    #[serde(default)]
    pub files_changed: Vec<String>,
}

/// Payload for `worktree.released` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeReleasedPayload {
    /// HEAD at release time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_commit: Option<String>,
    /// Whether the worktree directory was removed.
    pub deleted: bool,
    /// Whether the session branch was kept.
    pub branch_preserved: bool,
}

/// Payload for `worktree.merged` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeMergedPayload {
    /// Session branch.
    pub source_branch: String,
    /// Branch merged into.
    pub target_branch: String,
    /// Resulting commit on the target.
    pub merge_commit: String,
    /// `merge` or `squash`.
    pub strategy: String,
}
