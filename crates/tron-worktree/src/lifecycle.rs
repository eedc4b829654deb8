//! Worktree lifecycle: naming, creation, removal and pruning.
//!
//! Mutating functions take the executor's repository lock for their whole
//! git sequence, so a remove-then-prune never interleaves with another
//! session's `worktree add` on the same repository.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use tron_settings::WorktreeSettings;

use crate::errors::{Result, WorktreeError};
use crate::git::GitExecutor;
use crate::types::GitWorktreeEntry;

/// Make a session id safe for a directory and branch name component.
///
/// Anything outside `[A-Za-z0-9._-]` becomes `-`, and a leading `.` becomes
/// `_` so the directory is never hidden. A rewritten id gets a short hash of
/// the raw id appended, so two distinct ids never share a name.
pub fn sanitize_session_id(session_id: &str) -> String {
    let mut out: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    if out != session_id {
        out.push('-');
        out.push_str(&short_hash(session_id));
    }
    out
}

fn short_hash(raw: &str) -> String {
    Sha256::digest(raw.as_bytes())
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Base directory that holds every session worktree of a repository.
pub fn base_dir(repo_root: &Path, settings: &WorktreeSettings) -> PathBuf {
    repo_root.join(&settings.base_dir_name)
}

/// `<repo_root>/<baseDirName>/<sanitized id>`.
pub fn worktree_path(repo_root: &Path, settings: &WorktreeSettings, session_id: &str) -> PathBuf {
    base_dir(repo_root, settings).join(sanitize_session_id(session_id))
}

/// `<branchPrefix><sanitized id>`.
pub fn branch_name(settings: &WorktreeSettings, session_id: &str) -> String {
    format!("{}{}", settings.branch_prefix, sanitize_session_id(session_id))
}

/// Add `/<base_dir_name>/` to the repository's `info/exclude` if absent.
pub async fn ensure_excluded(git: &GitExecutor, repo_root: &Path, base_dir_name: &str) -> Result<()> {
    let exclude = git.git_path(repo_root, "info/exclude").await?;
    let pattern = format!("/{}/", base_dir_name.trim_matches('/'));

    let existing = match tokio::fs::read_to_string(&exclude).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }

    if let Some(parent) = exclude.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(&pattern);
    updated.push('\n');
    tokio::fs::write(&exclude, updated).await?;
    debug!(repo = %repo_root.display(), %pattern, "excluded worktree base dir");
    Ok(())
}

/// Create a worktree at `path` on `branch`.
///
/// An existing git checkout at `path` is reused when it is on `branch`; one
/// on any other branch is refused with [`WorktreeError::PathInUse`]. An
/// existing branch is checked out rather than recreated, so a session that
/// comes back after a preserved release picks up its own history.
pub async fn create_worktree(
    git: &GitExecutor,
    repo_root: &Path,
    path: &Path,
    branch: &str,
    start_commit: &str,
) -> Result<()> {
    let _guard = git.lock_repo(repo_root).await;

    if path.join(".git").exists() && git.is_repo(path).await {
        let current = git.current_branch(path).await?;
        if current.as_deref() != Some(branch) {
            return Err(WorktreeError::PathInUse {
                path: path.to_path_buf(),
                branch: current.unwrap_or_else(|| "HEAD".to_string()),
            });
        }
        debug!(path = %path.display(), "reusing existing worktree");
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let path_str = path.to_string_lossy();

    // A directory left behind by a crash without git metadata blocks `add`.
    prune_locked(git, repo_root).await?;

    if git.branch_exists(repo_root, branch).await? {
        let _ = git
            .run_checked(repo_root, &["worktree", "add", &path_str, branch])
            .await?;
    } else {
        let _ = git
            .run_checked(
                repo_root,
                &["worktree", "add", "-b", branch, &path_str, start_commit],
            )
            .await?;
    }
    debug!(path = %path.display(), branch, "created worktree");
    Ok(())
}

/// Remove the worktree at `path`, then prune stale references.
///
/// Falls back to deleting the directory when `git worktree remove` fails.
pub async fn remove_worktree(git: &GitExecutor, repo_root: &Path, path: &Path) -> Result<()> {
    let _guard = git.lock_repo(repo_root).await;
    remove_worktree_locked(git, repo_root, path).await
}

/// [`remove_worktree`] for callers already holding the repository lock.
pub(crate) async fn remove_worktree_locked(
    git: &GitExecutor,
    repo_root: &Path,
    path: &Path,
) -> Result<()> {
    let path_str = path.to_string_lossy();

    let out = git
        .run(repo_root, &["worktree", "remove", "--force", &path_str])
        .await?;
    if !out.success() {
        warn!(
            path = %path.display(),
            stderr = out.stderr.trim(),
            "git worktree remove failed, removing directory"
        );
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    prune_locked(git, repo_root).await
}

/// `git branch -D <branch>`.
pub async fn delete_branch(git: &GitExecutor, repo_root: &Path, branch: &str) -> Result<()> {
    let _guard = git.lock_repo(repo_root).await;
    let _ = git.run_checked(repo_root, &["branch", "-D", branch]).await?;
    Ok(())
}

/// `git worktree prune`.
pub async fn prune(git: &GitExecutor, repo_root: &Path) -> Result<()> {
    let _guard = git.lock_repo(repo_root).await;
    prune_locked(git, repo_root).await
}

pub(crate) async fn prune_locked(git: &GitExecutor, repo_root: &Path) -> Result<()> {
    let _ = git.run_checked(repo_root, &["worktree", "prune"]).await?;
    Ok(())
}

/// Worktrees git knows about, main checkout first.
pub async fn list_git_worktrees(git: &GitExecutor, repo_root: &Path) -> Result<Vec<GitWorktreeEntry>> {
    let out = git
        .run_checked(repo_root, &["worktree", "list", "--porcelain"])
        .await?;
    Ok(parse_worktree_list(&out.stdout))
}

/// Parse `git worktree list --porcelain`.
pub fn parse_worktree_list(stdout: &str) -> Vec<GitWorktreeEntry> {
    let mut entries = Vec::new();
    let mut current: Option<GitWorktreeEntry> = None;

    for line in stdout.lines() {
        if line.is_empty() {
            entries.extend(current.take());
            continue;
        }
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        if key == "worktree" {
            entries.extend(current.take());
            current = Some(GitWorktreeEntry {
                path: PathBuf::from(value),
                ..GitWorktreeEntry::default()
            });
            continue;
        }
        let Some(entry) = current.as_mut() else {
            continue;
        };
        match key {
            "HEAD" => entry.head = Some(value.to_string()),
            "branch" => {
                entry.branch = Some(value.strip_prefix("refs/heads/").unwrap_or(value).to_string());
            }
            "bare" => entry.bare = true,
            "detached" => entry.detached = true,
            _ => {}
        }
    }
    entries.extend(current);
    entries
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::test_support::{init_repo, write_file};
    use std::time::Duration;

    fn git() -> GitExecutor {
        GitExecutor::new(Duration::from_secs(30))
    }

    // ── Naming ──────────────────────────────────────────────────────────

    #[test]
    fn sanitize_keeps_safe_ids() {
        assert_eq!(sanitize_session_id("sess_01HX"), "sess_01HX");
        assert_eq!(sanitize_session_id("a.b-c_d"), "a.b-c_d");
    }

    #[test]
    fn sanitize_rewrites_and_suffixes_unsafe_ids() {
        let name = sanitize_session_id("a/b c:d");
        assert!(name.starts_with("a-b-c-d-"));
        assert_eq!(name.len(), "a-b-c-d-".len() + 8);
        assert!(sanitize_session_id(".hidden").starts_with("_hidden-"));
        assert!(sanitize_session_id("").starts_with("_-"));
        assert_eq!(sanitize_session_id("a/b c:d"), name);
    }

    #[test]
    fn sanitize_never_collides() {
        let ids = ["team/x", "team:x", "team-x", "team x", ".team-x", "_team-x"];
        let names: std::collections::HashSet<_> = ids.iter().map(|id| sanitize_session_id(id)).collect();
        assert_eq!(names.len(), ids.len());
    }

    #[test]
    fn paths_and_branches_follow_settings() {
        let settings = WorktreeSettings::default();
        let root = Path::new("/repo");
        assert_eq!(
            worktree_path(root, &settings, "s1"),
            PathBuf::from("/repo/.worktrees/s1")
        );
        assert_eq!(branch_name(&settings, "s1"), "session/s1");
        let name = sanitize_session_id("s/1");
        assert_eq!(worktree_path(root, &settings, "s/1"), root.join(".worktrees").join(&name));
        assert_eq!(branch_name(&settings, "s/1"), format!("session/{name}"));
    }

    // ── Porcelain ───────────────────────────────────────────────────────

    #[test]
    fn parses_worktree_list() {
        let out = "worktree /repo\nHEAD abc\nbranch refs/heads/main\n\n\
                   worktree /repo/.worktrees/s2\nHEAD def\nbranch refs/heads/session/s2\n\n\
                   worktree /tmp/detached\nHEAD 123\ndetached\n\n";
        let entries = parse_worktree_list(out);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(entries[1].path, PathBuf::from("/repo/.worktrees/s2"));
        assert_eq!(entries[1].branch.as_deref(), Some("session/s2"));
        assert!(entries[2].detached);
        assert!(entries[2].branch.is_none());
    }

    #[test]
    fn parses_bare_and_unterminated() {
        let entries = parse_worktree_list("worktree /srv/repo.git\nbare");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].bare);
        assert!(parse_worktree_list("").is_empty());
    }

    // ── Git ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn exclude_is_written_once() {
        let repo = init_repo();
        let git = git();
        ensure_excluded(&git, repo.path(), ".worktrees").await.unwrap();
        ensure_excluded(&git, repo.path(), ".worktrees").await.unwrap();
        let text = std::fs::read_to_string(repo.path().join(".git/info/exclude")).unwrap();
        assert_eq!(text.matches("/.worktrees/").count(), 1);
    }

    #[tokio::test]
    async fn create_list_remove() {
        let repo = init_repo();
        let git = git();
        let head = git.head_commit(repo.path()).await.unwrap();
        let path = repo.path().join(".worktrees/s2");

        create_worktree(&git, repo.path(), &path, "session/s2", &head).await.unwrap();
        assert!(path.join(".git").exists());
        assert_eq!(git.current_branch(&path).await.unwrap().as_deref(), Some("session/s2"));

        // Second create reuses the checkout.
        create_worktree(&git, repo.path(), &path, "session/s2", &head).await.unwrap();

        let listed = list_git_worktrees(&git, repo.path()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|e| e.branch.as_deref() == Some("session/s2")));

        remove_worktree(&git, repo.path(), &path).await.unwrap();
        assert!(!path.exists());
        assert_eq!(list_git_worktrees(&git, repo.path()).await.unwrap().len(), 1);
        assert!(git.branch_exists(repo.path(), "session/s2").await.unwrap());

        delete_branch(&git, repo.path(), "session/s2").await.unwrap();
        assert!(!git.branch_exists(repo.path(), "session/s2").await.unwrap());
    }

    #[tokio::test]
    async fn create_checks_out_existing_branch() {
        let repo = init_repo();
        let git = git();
        let head = git.head_commit(repo.path()).await.unwrap();
        let path = repo.path().join(".worktrees/s3");

        create_worktree(&git, repo.path(), &path, "session/s3", &head).await.unwrap();
        write_file(&path, "work.txt", "x\n");
        let commit = git.commit_all(&path, "work").await.unwrap().unwrap();
        remove_worktree(&git, repo.path(), &path).await.unwrap();

        create_worktree(&git, repo.path(), &path, "session/s3", &head).await.unwrap();
        assert_eq!(git.head_commit(&path).await.unwrap(), commit.hash);
        assert!(path.join("work.txt").exists());
    }

    #[tokio::test]
    async fn create_refuses_checkout_on_another_branch() {
        let repo = init_repo();
        let git = git();
        let head = git.head_commit(repo.path()).await.unwrap();
        let path = repo.path().join(".worktrees/shared");

        create_worktree(&git, repo.path(), &path, "session/a", &head).await.unwrap();
        let err = create_worktree(&git, repo.path(), &path, "session/b", &head)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorktreeError::PathInUse { ref branch, .. } if branch == "session/a"
        ));
        assert!(!git.branch_exists(repo.path(), "session/b").await.unwrap());
    }

    #[tokio::test]
    async fn remove_falls_back_to_filesystem() {
        let repo = init_repo();
        let git = git();
        let stray = repo.path().join(".worktrees/stray");
        std::fs::create_dir_all(&stray).unwrap();
        write_file(&stray, "junk.txt", "junk");

        remove_worktree(&git, repo.path(), &stray).await.unwrap();
        assert!(!stray.exists());
    }
}
