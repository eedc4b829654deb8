//! Merging a session branch into a target branch.
//!
//! The merge runs in whichever worktree has the target checked out, or in a
//! short-lived hidden worktree under the base directory when none does. A
//! conflicted merge is aborted with git's own machinery, so the target is
//! either fully merged or untouched.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tron_settings::{MergeStrategy, WorktreeSettings};

use crate::errors::{Result, WorktreeError};
use crate::git::GitExecutor;
use crate::lifecycle::{self, base_dir};
use crate::types::MergeResult;

/// One merge request.
#[derive(Clone, Copy, Debug)]
pub struct MergeRequest<'a> {
    /// Repository root.
    pub repo_root: &'a Path,
    /// Session branch being merged.
    pub source_branch: &'a str,
    /// Branch receiving the work.
    pub target_branch: &'a str,
    /// `--no-ff` merge or squash commit.
    pub strategy: MergeStrategy,
    /// Commit message for the resulting commit.
    pub message: &'a str,
}

/// Merge `source_branch` into `target_branch`.
///
/// Conflicts come back as an unsuccessful [`MergeResult`]. Errors are
/// reserved for git failures that are not conflicts.
pub async fn merge_branch(
    git: &GitExecutor,
    settings: &WorktreeSettings,
    request: &MergeRequest<'_>,
) -> Result<MergeResult> {
    let _guard = git.lock_repo(request.repo_root).await;

    let checked_out = lifecycle::list_git_worktrees(git, request.repo_root)
        .await?
        .into_iter()
        .find(|entry| entry.branch.as_deref() == Some(request.target_branch))
        .map(|entry| entry.path);

    if let Some(dir) = checked_out {
        debug!(dir = %dir.display(), target = request.target_branch, "merging in place");
        return merge_in(git, &dir, request).await;
    }

    if !git.branch_exists(request.repo_root, request.target_branch).await? {
        return Ok(MergeResult::refused(
            format!("target branch '{}' does not exist", request.target_branch),
            request.strategy,
        ));
    }

    let scratch = scratch_path(request.repo_root, settings);
    let scratch_str = scratch.to_string_lossy();
    let _ = git
        .run_checked(
            request.repo_root,
            &["worktree", "add", &scratch_str, request.target_branch],
        )
        .await?;
    debug!(dir = %scratch.display(), target = request.target_branch, "merging in scratch worktree");

    let result = merge_in(git, &scratch, request).await;
    if let Err(e) = lifecycle::remove_worktree_locked(git, request.repo_root, &scratch).await {
        warn!(dir = %scratch.display(), error = %e, "failed to remove scratch merge worktree");
    }
    result
}

fn scratch_path(repo_root: &Path, settings: &WorktreeSettings) -> PathBuf {
    base_dir(repo_root, settings).join(format!(".merge-{}", uuid::Uuid::now_v7().simple()))
}

async fn merge_in(git: &GitExecutor, dir: &Path, request: &MergeRequest<'_>) -> Result<MergeResult> {
    let out = match request.strategy {
        MergeStrategy::Merge => {
            git.run(
                dir,
                &["merge", "--no-ff", "--no-verify", "-m", request.message, request.source_branch],
            )
            .await?
        }
        MergeStrategy::Squash => git.run(dir, &["merge", "--squash", request.source_branch]).await?,
    };

    if !out.success() {
        let conflicts = git.conflicted_files(dir).await.unwrap_or_default();
        abort(git, dir, request.strategy).await;
        if conflicts.is_empty() {
            return Err(WorktreeError::GitCommandFailed {
                command: format!("merge {}", request.source_branch),
                exit_code: out.exit_code,
                stderr: non_empty(&out.stderr, &out.stdout),
            });
        }
        info!(
            source = request.source_branch,
            target = request.target_branch,
            conflicts = conflicts.len(),
            "merge conflicted, aborted"
        );
        return Ok(MergeResult {
            success: false,
            merge_commit: None,
            conflicts,
            strategy: request.strategy,
        });
    }

    if request.strategy == MergeStrategy::Squash {
        let staged = git.run(dir, &["diff", "--cached", "--quiet"]).await?;
        if !staged.success() {
            let commit = git
                .run(dir, &["commit", "--no-verify", "-m", request.message])
                .await?;
            if !commit.success() {
                abort(git, dir, request.strategy).await;
                return Err(WorktreeError::GitCommandFailed {
                    command: "commit --no-verify -m <message>".into(),
                    exit_code: commit.exit_code,
                    stderr: non_empty(&commit.stderr, &commit.stdout),
                });
            }
        }
    }

    let merge_commit = git.head_commit(dir).await?;
    info!(
        source = request.source_branch,
        target = request.target_branch,
        commit = %merge_commit,
        strategy = %request.strategy,
        "merged session branch"
    );
    Ok(MergeResult {
        success: true,
        merge_commit: Some(merge_commit),
        conflicts: Vec::new(),
        strategy: request.strategy,
    })
}

/// Undo a failed merge. Squash leaves no `MERGE_HEAD`, so it needs `reset --merge`.
async fn abort(git: &GitExecutor, dir: &Path, strategy: MergeStrategy) {
    let args: &[&str] = match strategy {
        MergeStrategy::Merge => &["merge", "--abort"],
        MergeStrategy::Squash => &["reset", "--merge"],
    };
    match git.run(dir, args).await {
        Ok(out) if out.success() => {}
        Ok(out) => warn!(dir = %dir.display(), stderr = out.stderr.trim(), "merge abort failed"),
        Err(e) => warn!(dir = %dir.display(), error = %e, "merge abort failed"),
    }
}

fn non_empty(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() { stdout.trim() } else { stderr }.to_string()
}
