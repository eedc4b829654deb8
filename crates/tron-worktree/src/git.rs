//! Git command executor.
//!
//! Every invocation goes through `tokio::process` with `kill_on_drop` and a
//! timeout, so a hung git never blocks the reactor and never outlives its
//! caller. A non-zero exit is data ([`GitOutput`]), not an error; callers
//! that need success use [`GitExecutor::run_checked`].
//!
//! Structural mutations of one repository (worktree add/remove/prune, branch
//! deletion, merges) must hold [`GitExecutor::lock_repo`] for that root.
//! Read-only queries run unserialized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::process::Command;
use tokio::sync::OwnedMutexGuard;
use tracing::trace;
use tron_settings::WorktreeSettings;

use crate::errors::{Result, WorktreeError};
use crate::types::CommitInfo;

/// Captured result of one git invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitOutput {
    /// Exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Raw stdout.
    pub stdout: String,
    /// Raw stderr.
    pub stderr: String,
}

impl GitOutput {
    /// Exit code 0.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout without surrounding whitespace.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Runs git with a bounded timeout and per-repository structural locks.
#[derive(Debug)]
pub struct GitExecutor {
    timeout: Duration,
    repo_locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl GitExecutor {
    /// Executor with a per-command timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Executor using `worktree.commandTimeoutMs`.
    pub fn from_settings(settings: &WorktreeSettings) -> Self {
        Self::new(Duration::from_millis(settings.command_timeout_ms))
    }

    /// Run `git <args>` in `cwd`. Fails only on spawn errors and timeouts.
    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let command = args.join(" ");
        trace!(cwd = %cwd.display(), %command, "git");
        let result = tokio::time::timeout(
            self.timeout,
            Command::new("git")
                .args(args)
                .current_dir(cwd)
                .env("GIT_TERMINAL_PROMPT", "0")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match result {
            Ok(output) => output?,
            Err(_) => {
                return Err(WorktreeError::Timeout {
                    command,
                    timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
        };
        Ok(GitOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    /// Run and require exit code 0.
    pub async fn run_checked(&self, cwd: &Path, args: &[&str]) -> Result<GitOutput> {
        let output = self.run(cwd, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(WorktreeError::GitCommandFailed {
                command: args.join(" "),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }

    /// Exclusive structural access to the repository at `repo_root`.
    pub async fn lock_repo(&self, repo_root: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.repo_locks.lock();
            Arc::clone(locks.entry(repo_root.to_path_buf()).or_default())
        };
        lock.lock_owned().await
    }

    // ── Queries ─────────────────────────────────────────────────────────

    /// Whether `path` is inside a git working tree.
    pub async fn is_repo(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        matches!(
            self.run(path, &["rev-parse", "--is-inside-work-tree"]).await,
            Ok(out) if out.success() && out.stdout_trimmed() == "true"
        )
    }

    /// Top-level directory of the working tree containing `path`.
    pub async fn repo_root(&self, path: &Path) -> Result<PathBuf> {
        let out = self.run(path, &["rev-parse", "--show-toplevel"]).await?;
        if !out.success() {
            return Err(WorktreeError::NotAGitRepository(path.to_path_buf()));
        }
        Ok(PathBuf::from(out.stdout_trimmed()))
    }

    /// Commit at `HEAD`.
    pub async fn head_commit(&self, cwd: &Path) -> Result<String> {
        let out = self.run_checked(cwd, &["rev-parse", "HEAD"]).await?;
        Ok(out.stdout_trimmed().to_string())
    }

    /// Checked-out branch, `None` when detached.
    pub async fn current_branch(&self, cwd: &Path) -> Result<Option<String>> {
        let out = self.run(cwd, &["symbolic-ref", "--short", "-q", "HEAD"]).await?;
        Ok(out
            .success()
            .then(|| out.stdout_trimmed().to_string())
            .filter(|b| !b.is_empty()))
    }

    /// Whether `refs/heads/<branch>` exists.
    pub async fn branch_exists(&self, cwd: &Path, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let out = self
            .run(cwd, &["rev-parse", "--verify", "--quiet", &reference])
            .await?;
        Ok(out.success())
    }

    /// Paths with staged, unstaged or untracked changes.
    pub async fn changed_files(&self, cwd: &Path) -> Result<Vec<String>> {
        let out = self
            .run_checked(cwd, &["status", "--porcelain", "--untracked-files=all"])
            .await?;
        Ok(parse_porcelain_status(&out.stdout))
    }

    /// Whether the working tree differs from `HEAD`.
    pub async fn has_changes(&self, cwd: &Path) -> Result<bool> {
        Ok(!self.changed_files(cwd).await?.is_empty())
    }

    /// Paths left unmerged by a conflicted merge.
    pub async fn conflicted_files(&self, cwd: &Path) -> Result<Vec<String>> {
        let out = self
            .run_checked(cwd, &["diff", "--name-only", "--diff-filter=U"])
            .await?;
        Ok(out
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    /// Resolve a path inside the git directory (e.g. `info/exclude`).
    pub async fn git_path(&self, cwd: &Path, name: &str) -> Result<PathBuf> {
        let out = self.run_checked(cwd, &["rev-parse", "--git-path", name]).await?;
        let path = PathBuf::from(out.stdout_trimmed());
        Ok(if path.is_absolute() { path } else { cwd.join(path) })
    }

    // ── Mutations ───────────────────────────────────────────────────────

    /// Stage everything and commit. `None` when there was nothing to commit.
    pub async fn commit_all(&self, cwd: &Path, message: &str) -> Result<Option<CommitInfo>> {
        let files = self.changed_files(cwd).await?;
        if files.is_empty() {
            return Ok(None);
        }
        let _ = self.run_checked(cwd, &["add", "-A"]).await?;
        let out = self
            .run(cwd, &["commit", "--no-verify", "-m", message])
            .await?;
        if !out.success() {
            if out.stdout.contains("nothing to commit") {
                return Ok(None);
            }
            return Err(WorktreeError::GitCommandFailed {
                command: "commit --no-verify -m <message>".into(),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            });
        }
        Ok(Some(CommitInfo {
            hash: self.head_commit(cwd).await?,
            message: message.to_string(),
            files_changed: files,
        }))
    }
}

/// Paths from `git status --porcelain` (v1). Renames yield the new path.
pub fn parse_porcelain_status(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.len() > 3)
        .map(|line| {
            let path = &line[3..];
            path.rsplit_once(" -> ").map_or(path, |(_, to)| to)
        })
        .map(|path| path.trim_matches('"').to_string())
        .collect()
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::test_support::{init_repo, write_file};

    fn executor() -> GitExecutor {
        GitExecutor::new(Duration::from_secs(30))
    }

    // ── Parsing ─────────────────────────────────────────────────────────

    #[test]
    fn porcelain_paths() {
        let out = " M src/lib.rs\n?? notes.txt\nR  old.rs -> new.rs\nA  \"with space.txt\"\n";
        assert_eq!(
            parse_porcelain_status(out),
            vec!["src/lib.rs", "notes.txt", "new.rs", "with space.txt"]
        );
        assert!(parse_porcelain_status("").is_empty());
    }

    // ── Execution ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn non_zero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = executor().run(dir.path(), &["rev-parse", "HEAD"]).await.unwrap();
        assert!(!out.success());
        assert!(!out.stderr.is_empty());
    }

    #[tokio::test]
    async fn run_checked_reports_command_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let err = executor()
            .run_checked(dir.path(), &["rev-parse", "HEAD"])
            .await
            .unwrap_err();
        match err {
            WorktreeError::GitCommandFailed { command, exit_code, stderr } => {
                assert_eq!(command, "rev-parse HEAD");
                assert_ne!(exit_code, Some(0));
                assert!(!stderr.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn repository_queries() {
        let repo = init_repo();
        let git = executor();
        assert!(git.is_repo(repo.path()).await);
        assert!(!git.is_repo(&repo.path().join("missing")).await);

        let plain = tempfile::tempdir().unwrap();
        assert!(!git.is_repo(plain.path()).await);
        assert!(matches!(
            git.repo_root(plain.path()).await,
            Err(WorktreeError::NotAGitRepository(_))
        ));

        let root = git.repo_root(repo.path()).await.unwrap();
        assert_eq!(root, std::fs::canonicalize(repo.path()).unwrap());
        assert_eq!(git.current_branch(repo.path()).await.unwrap().as_deref(), Some("main"));
        assert_eq!(git.head_commit(repo.path()).await.unwrap().len(), 40);
        assert!(git.branch_exists(repo.path(), "main").await.unwrap());
        assert!(!git.branch_exists(repo.path(), "nope").await.unwrap());
    }

    #[tokio::test]
    async fn commit_all_commits_once() {
        let repo = init_repo();
        let git = executor();
        assert!(git.commit_all(repo.path(), "nothing").await.unwrap().is_none());

        write_file(repo.path(), "a.txt", "a\n");
        assert!(git.has_changes(repo.path()).await.unwrap());
        let info = git.commit_all(repo.path(), "add a").await.unwrap().unwrap();
        assert_eq!(info.files_changed, vec!["a.txt"]);
        assert_eq!(info.hash, git.head_commit(repo.path()).await.unwrap());
        assert!(!git.has_changes(repo.path()).await.unwrap());
    }

    #[tokio::test]
    async fn zero_timeout_reports_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitExecutor::new(Duration::ZERO);
        // The child may finish inside the first poll; only a timeout is checked.
        if let Err(err) = git.run(dir.path(), &["--version"]).await {
            assert!(matches!(err, WorktreeError::Timeout { timeout_ms: 0, .. }));
            assert!(err.is_transient());
        }
    }

    #[tokio::test]
    async fn repo_lock_serializes() {
        let git = Arc::new(executor());
        let root = PathBuf::from("/tmp/repo-lock-test");
        let guard = git.lock_repo(&root).await;

        let contender = {
            let git = Arc::clone(&git);
            let root = root.clone();
            tokio::spawn(async move {
                let _guard = git.lock_repo(&root).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }
}
