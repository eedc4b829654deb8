//! Recovery of worktrees left behind by sessions that no longer exist.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tron_settings::WorktreeSettings;

use crate::git::GitExecutor;
use crate::lifecycle::{self, base_dir};
use crate::types::RecoveryResult;

/// Commit message used when saving an orphan's pending changes.
pub fn recovery_message(name: &str) -> String {
    format!("[RECOVERED] Session {name}")
}

/// Which base-dir entries must be left alone.
#[derive(Debug, Default)]
pub struct RecoveryScope<'a> {
    /// Directory names (sanitized ids) of active sessions.
    pub active: HashSet<String>,
    /// Orphans already recovered and preserved by an earlier scan.
    pub already_recovered: Option<&'a HashSet<PathBuf>>,
}

/// Scan the base directory of `repo_root` and reconcile every orphan.
///
/// Never fails as a whole: a missing base directory yields no results, and
/// per-orphan failures land in [`RecoveryResult::error`]. Stale worktree
/// references are pruned at the end regardless.
pub async fn recover_orphans(
    git: &GitExecutor,
    settings: &WorktreeSettings,
    repo_root: &Path,
    scope: &RecoveryScope<'_>,
) -> Vec<RecoveryResult> {
    let orphans = match scan(&base_dir(repo_root, settings), scope).await {
        Ok(orphans) => orphans,
        Err(e) => {
            warn!(repo = %repo_root.display(), error = %e, "cannot scan worktree base dir");
            Vec::new()
        }
    };

    let mut results = Vec::with_capacity(orphans.len());
    for (name, path) in orphans {
        results.push(recover_one(git, settings, repo_root, name, path).await);
    }

    if let Err(e) = lifecycle::prune(git, repo_root).await {
        warn!(repo = %repo_root.display(), error = %e, "worktree prune failed after recovery");
    }
    if !results.is_empty() {
        info!(
            repo = %repo_root.display(),
            orphans = results.len(),
            failed = results.iter().filter(|r| r.error.is_some()).count(),
            "recovered orphaned worktrees"
        );
    }
    results
}

async fn scan(base: &Path, scope: &RecoveryScope<'_>) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut dir = match tokio::fs::read_dir(base).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut orphans = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || scope.active.contains(&name) {
            continue;
        }
        let path = entry.path();
        if scope.already_recovered.is_some_and(|seen| seen.contains(&path)) {
            continue;
        }
        if entry.file_type().await.is_ok_and(|t| t.is_dir()) {
            orphans.push((name, path));
        }
    }
    orphans.sort();
    Ok(orphans)
}

async fn recover_one(
    git: &GitExecutor,
    settings: &WorktreeSettings,
    repo_root: &Path,
    name: String,
    path: PathBuf,
) -> RecoveryResult {
    let mut result = RecoveryResult {
        session_id: name,
        path,
        ..RecoveryResult::default()
    };

    if result.path.join(".git").exists() {
        match git.has_changes(&result.path).await {
            Ok(dirty) => result.had_changes = dirty,
            Err(e) => result.error = Some(e.to_string()),
        }
        if result.had_changes {
            match git
                .commit_all(&result.path, &recovery_message(&result.session_id))
                .await
            {
                Ok(commit) => result.committed = commit.is_some(),
                Err(e) => result.error = Some(e.to_string()),
            }
        }
    }

    // Uncommitted work stays on disk if the commit failed.
    let safe_to_delete = !result.had_changes || result.committed;
    if settings.delete_on_recovery && safe_to_delete {
        match lifecycle::remove_worktree(git, repo_root, &result.path).await {
            Ok(()) => result.deleted = true,
            Err(e) => {
                if result.error.is_none() {
                    result.error = Some(e.to_string());
                }
            }
        }
    }

    if let Some(error) = &result.error {
        warn!(orphan = %result.session_id, %error, "orphan recovery failed");
    }
    result
}
