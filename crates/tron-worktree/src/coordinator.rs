//! Per-session working directory coordination.
//!
//! [`WorktreeCoordinator`] decides, creates, tracks and tears down the
//! working directory of every session. All coordinator state sits behind one
//! `parking_lot` mutex that is never held across an `.await`; per-session
//! `tokio` locks serialize acquire, release and merge of the same session.
//! Orphan recovery takes the recovery gate exclusively, while acquire and
//! release hold it shared from their state change until their git work is
//! done, so a recovery scan never sees a half-created or half-released
//! worktree.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedMutexGuard, RwLock};
use tracing::{debug, info, instrument, warn};
use tron_core::retry::RetryConfig;
use tron_events::types::payloads::worktree::{
    WorktreeAcquiredPayload, WorktreeCommitPayload, WorktreeForkSource, WorktreeMergedPayload,
    WorktreeReleasedPayload,
};
use tron_settings::{MergeStrategy, WorktreeSettings};

use crate::errors::{Result, WorktreeError};
use crate::git::GitExecutor;
use crate::isolation::{IsolationOptions, should_isolate};
use crate::lifecycle::{self, sanitize_session_id};
use crate::merge::{MergeRequest, merge_branch};
use crate::recovery::{RecoveryScope, recover_orphans};
use crate::sink::{NoopSink, WorktreeEvent, WorktreeEventSink};
use crate::types::{
    AcquireOptions, CommitInfo, GitWorktreeEntry, MergeResult, NO_BRANCH, RecoveryResult,
    ReleaseOptions, WorkingDirectory, WorktreeStatus,
};

#[derive(Debug, Default)]
struct CoordinatorState {
    active: HashMap<String, WorkingDirectory>,
    /// Repository root → session that holds its main directory.
    main_owner: HashMap<PathBuf, String>,
    /// Orphans recovered but kept on disk.
    recovered: HashSet<PathBuf>,
}

/// Hands out and reclaims session working directories.
pub struct WorktreeCoordinator {
    settings: WorktreeSettings,
    git: GitExecutor,
    sink: Arc<dyn WorktreeEventSink>,
    state: Mutex<CoordinatorState>,
    session_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    recovery_gate: RwLock<()>,
}

impl std::fmt::Debug for WorktreeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorktreeCoordinator")
            .field("settings", &self.settings)
            .field("active", &self.state.lock().active.len())
            .finish_non_exhaustive()
    }
}

impl WorktreeCoordinator {
    /// Coordinator that discards lifecycle events.
    pub fn new(settings: WorktreeSettings) -> Self {
        Self::with_sink(settings, Arc::new(NoopSink))
    }

    /// Coordinator reporting lifecycle events to `sink`.
    pub fn with_sink(settings: WorktreeSettings, sink: Arc<dyn WorktreeEventSink>) -> Self {
        Self {
            git: GitExecutor::from_settings(&settings),
            settings,
            sink,
            state: Mutex::new(CoordinatorState::default()),
            session_locks: Mutex::new(HashMap::new()),
            recovery_gate: RwLock::new(()),
        }
    }

    /// Active settings.
    pub fn settings(&self) -> &WorktreeSettings {
        &self.settings
    }

    /// The git executor shared by every operation.
    pub fn git(&self) -> &GitExecutor {
        &self.git
    }

    /// Handle of an active session.
    pub fn get(&self, session_id: &str) -> Option<WorkingDirectory> {
        self.state.lock().active.get(session_id).cloned()
    }

    /// Active handles, sorted by session id.
    pub fn list_worktrees(&self) -> Vec<WorkingDirectory> {
        let mut handles: Vec<_> = self.state.lock().active.values().cloned().collect();
        handles.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        handles
    }

    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.session_locks.lock();
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    fn forget_session_lock(&self, session_id: &str) {
        let mut locks = self.session_locks.lock();
        if locks.get(session_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            let _ = locks.remove(session_id);
        }
    }

    // ── Acquire ─────────────────────────────────────────────────────────

    /// Give `session_id` a working directory in `repo_path`.
    ///
    /// Idempotent: an active session gets its existing handle back. Outside
    /// git the handle aliases `repo_path` with branch [`NO_BRANCH`].
    #[instrument(skip(self, repo_path, options), fields(repo = %repo_path.display()))]
    pub async fn acquire(
        &self,
        session_id: &str,
        repo_path: &Path,
        options: &AcquireOptions,
    ) -> Result<WorkingDirectory> {
        let _session = self.lock_session(session_id).await;
        if let Some(existing) = self.get(session_id) {
            return Ok(existing);
        }
        let _gate = self.recovery_gate.read().await;

        if !self.git.is_repo(repo_path).await {
            let handle = WorkingDirectory {
                session_id: session_id.to_string(),
                path: repo_path.to_path_buf(),
                isolated: false,
                branch: NO_BRANCH.to_string(),
                base_commit: String::new(),
                repo_root: None,
                parent_session_id: options.parent_session_id.clone(),
            };
            debug!("not a git repository, sharing directory");
            return Ok(self.register(handle, None));
        }

        let repo_root = self.git.repo_root(repo_path).await?;
        let isolate = {
            let mut state = self.state.lock();
            let owner = state.main_owner.get(&repo_root).map(String::as_str);
            let isolate = should_isolate(
                session_id,
                self.settings.isolation_mode,
                owner,
                &IsolationOptions {
                    force_isolation: options.force_isolation,
                    parent_session_id: options.parent_session_id.as_deref(),
                },
            );
            if !isolate {
                let _ = state
                    .main_owner
                    .entry(repo_root.clone())
                    .or_insert_with(|| session_id.to_string());
            }
            isolate
        };

        let handle = if isolate {
            self.create_isolated(session_id, &repo_root, options).await?
        } else {
            self.shared_handle(session_id, &repo_root, options).await
        };
        let forked_from = match (&handle.parent_session_id, handle.isolated) {
            (Some(parent), true) => Some(WorktreeForkSource {
                session_id: parent.clone(),
                commit: handle.base_commit.clone(),
            }),
            _ => None,
        };
        info!(
            path = %handle.path.display(),
            isolated = handle.isolated,
            branch = %handle.branch,
            "acquired working directory"
        );
        Ok(self.register(handle, forked_from))
    }

    /// Acquire an isolated directory for `child_session_id`, branched from
    /// the parent's current commit. The `never` mode still shares.
    pub async fn fork(
        &self,
        parent_session_id: &str,
        child_session_id: &str,
        repo_path: &Path,
    ) -> Result<WorkingDirectory> {
        self.acquire(
            child_session_id,
            repo_path,
            &AcquireOptions {
                force_isolation: true,
                parent_session_id: Some(parent_session_id.to_string()),
                parent_commit: None,
            },
        )
        .await
    }

    fn register(
        &self,
        handle: WorkingDirectory,
        forked_from: Option<WorktreeForkSource>,
    ) -> WorkingDirectory {
        let _ = self
            .state
            .lock()
            .active
            .insert(handle.session_id.clone(), handle.clone());
        self.sink.emit(
            &handle.session_id,
            WorktreeEvent::Acquired(WorktreeAcquiredPayload {
                path: handle.path.to_string_lossy().into_owned(),
                branch: handle.branch.clone(),
                base_commit: handle.base_commit.clone(),
                isolated: handle.isolated,
                forked_from,
            }),
        );
        handle
    }

    async fn shared_handle(
        &self,
        session_id: &str,
        repo_root: &Path,
        options: &AcquireOptions,
    ) -> WorkingDirectory {
        let branch = match self.git.current_branch(repo_root).await {
            Ok(Some(branch)) => branch,
            _ => "HEAD".to_string(),
        };
        // A repository without commits has no HEAD yet.
        let base_commit = self.git.head_commit(repo_root).await.unwrap_or_default();
        WorkingDirectory {
            session_id: session_id.to_string(),
            path: repo_root.to_path_buf(),
            isolated: false,
            branch,
            base_commit,
            repo_root: Some(repo_root.to_path_buf()),
            parent_session_id: options.parent_session_id.clone(),
        }
    }

    async fn create_isolated(
        &self,
        session_id: &str,
        repo_root: &Path,
        options: &AcquireOptions,
    ) -> Result<WorkingDirectory> {
        lifecycle::ensure_excluded(&self.git, repo_root, &self.settings.base_dir_name).await?;

        let start = self.start_commit(repo_root, options).await?;
        let path = lifecycle::worktree_path(repo_root, &self.settings, session_id);
        let branch = lifecycle::branch_name(&self.settings, session_id);
        lifecycle::create_worktree(&self.git, repo_root, &path, &branch, &start).await?;
        let base_commit = self.git.head_commit(&path).await?;

        Ok(WorkingDirectory {
            session_id: session_id.to_string(),
            path,
            isolated: true,
            branch,
            base_commit,
            repo_root: Some(repo_root.to_path_buf()),
            parent_session_id: options.parent_session_id.clone(),
        })
    }

    /// Explicit commit, else the parent's current HEAD, else the repo HEAD.
    async fn start_commit(&self, repo_root: &Path, options: &AcquireOptions) -> Result<String> {
        if let Some(commit) = &options.parent_commit {
            return Ok(commit.clone());
        }
        let parent_dir = options
            .parent_session_id
            .as_deref()
            .and_then(|parent| self.get(parent))
            .filter(WorkingDirectory::is_git_backed)
            .map(|handle| handle.path);
        match parent_dir {
            Some(dir) => self.git.head_commit(&dir).await,
            None => self.git.head_commit(repo_root).await,
        }
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Give back the session's working directory. Never fails.
    ///
    /// Pending changes are committed first when auto-commit is on. An
    /// isolated worktree is removed only once its work is safely committed.
    #[instrument(skip(self, options))]
    pub async fn release(&self, session_id: &str, options: &ReleaseOptions) {
        let guard = self.lock_session(session_id).await;
        let gate = self.recovery_gate.read().await;
        let handle = {
            let mut state = self.state.lock();
            let Some(handle) = state.active.remove(session_id) else {
                drop(state);
                drop(gate);
                drop(guard);
                self.forget_session_lock(session_id);
                debug!("release of unknown session ignored");
                return;
            };
            if let Some(root) = &handle.repo_root {
                if state.main_owner.get(root).is_some_and(|owner| owner == session_id) {
                    let _ = state.main_owner.remove(root);
                }
            }
            handle
        };

        let payload = if handle.is_git_backed() {
            self.release_git(&handle, options).await
        } else {
            WorktreeReleasedPayload {
                final_commit: None,
                deleted: false,
                branch_preserved: false,
            }
        };
        info!(
            deleted = payload.deleted,
            branch_preserved = payload.branch_preserved,
            "released working directory"
        );
        self.sink.emit(session_id, WorktreeEvent::Released(payload));

        drop(gate);
        drop(guard);
        self.forget_session_lock(session_id);
    }

    async fn release_git(
        &self,
        handle: &WorkingDirectory,
        options: &ReleaseOptions,
    ) -> WorktreeReleasedPayload {
        let mut clean = true;
        if self.settings.auto_commit_on_release {
            let message = options
                .commit_message
                .clone()
                .unwrap_or_else(|| format!("Auto-save: session {}", handle.session_id));
            match self.commit_with_retry(&handle.path, &message).await {
                Ok(Some(commit)) => self.emit_commit(&handle.session_id, commit),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "auto-commit on release failed");
                    clean = false;
                }
            }
        } else if handle.isolated {
            clean = !self.git.has_changes(&handle.path).await.unwrap_or(true);
        }

        let final_commit = self.git.head_commit(&handle.path).await.ok();
        let Some(repo_root) = handle.repo_root.as_deref().filter(|_| handle.isolated) else {
            return WorktreeReleasedPayload {
                final_commit,
                deleted: false,
                branch_preserved: true,
            };
        };

        let delete = options
            .delete_worktree
            .unwrap_or(self.settings.delete_worktree_on_release);
        let mut deleted = false;
        if delete && clean {
            match lifecycle::remove_worktree(&self.git, repo_root, &handle.path).await {
                Ok(()) => deleted = true,
                Err(e) => warn!(error = %e, "worktree removal failed"),
            }
        } else if delete {
            warn!(path = %handle.path.display(), "keeping worktree with uncommitted changes");
        }

        let mut branch_preserved = true;
        let preserve = options.preserve_branch.unwrap_or(self.settings.preserve_branches);
        if deleted && !preserve {
            match lifecycle::delete_branch(&self.git, repo_root, &handle.branch).await {
                Ok(()) => branch_preserved = false,
                Err(e) => warn!(branch = %handle.branch, error = %e, "branch deletion failed"),
            }
        }

        WorktreeReleasedPayload {
            final_commit,
            deleted,
            branch_preserved,
        }
    }

    async fn commit_with_retry(&self, dir: &Path, message: &str) -> Result<Option<CommitInfo>> {
        let retry = RetryConfig::with_max_retries(self.settings.commit_retries);
        let mut attempt = 0;
        loop {
            match self.git.commit_all(dir, message).await {
                Ok(commit) => return Ok(commit),
                Err(e) if attempt < retry.max_retries && e.is_transient() => {
                    let delay = retry.delay_ms(attempt, rand::random());
                    debug!(attempt, delay_ms = delay, error = %e, "retrying commit");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn emit_commit(&self, session_id: &str, commit: CommitInfo) {
        self.sink.emit(
            session_id,
            WorktreeEvent::Commit(WorktreeCommitPayload {
                commit_hash: commit.hash,
                message: commit.message,
                files_changed: commit.files_changed,
            }),
        );
    }

    // ── Commit / status ─────────────────────────────────────────────────

    /// Commit everything pending in the session's directory. `None` when
    /// there was nothing to commit or the directory is outside git.
    #[instrument(skip(self, message))]
    pub async fn commit(&self, session_id: &str, message: &str) -> Result<Option<CommitInfo>> {
        let handle = self
            .get(session_id)
            .ok_or_else(|| WorktreeError::SessionNotActive(session_id.to_string()))?;
        if !handle.is_git_backed() {
            return Ok(None);
        }
        let commit = self.git.commit_all(&handle.path, message).await?;
        if let Some(commit) = &commit {
            self.emit_commit(session_id, commit.clone());
        }
        Ok(commit)
    }

    /// Handle plus live git status, `None` for an inactive session.
    pub async fn get_status(&self, session_id: &str) -> Result<Option<WorktreeStatus>> {
        let Some(handle) = self.get(session_id) else {
            return Ok(None);
        };
        if !handle.is_git_backed() {
            return Ok(Some(WorktreeStatus {
                working_directory: handle,
                has_uncommitted_changes: false,
                current_commit: None,
            }));
        }
        let has_uncommitted_changes = self.git.has_changes(&handle.path).await?;
        let current_commit = self.git.head_commit(&handle.path).await.ok();
        Ok(Some(WorktreeStatus {
            working_directory: handle,
            has_uncommitted_changes,
            current_commit,
        }))
    }

    // ── Merge ───────────────────────────────────────────────────────────

    /// Merge the session's branch into `target_branch`.
    ///
    /// A shared session is refused without touching git: its changes already
    /// live on the main checkout's branch.
    #[instrument(skip(self))]
    pub async fn merge_session(
        &self,
        session_id: &str,
        target_branch: &str,
        strategy: Option<MergeStrategy>,
    ) -> Result<MergeResult> {
        let strategy = strategy.unwrap_or(self.settings.default_merge_strategy);
        let _session = self.lock_session(session_id).await;
        let handle = self
            .get(session_id)
            .ok_or_else(|| WorktreeError::SessionNotActive(session_id.to_string()))?;

        let Some(repo_root) = handle.repo_root.as_deref().filter(|_| handle.isolated) else {
            return Ok(MergeResult::refused(
                format!(
                    "session {session_id} is not isolated; its changes are already on '{}'",
                    handle.branch
                ),
                strategy,
            ));
        };
        if handle.branch == target_branch {
            return Ok(MergeResult::refused(
                format!("cannot merge branch '{target_branch}' into itself"),
                strategy,
            ));
        }

        if let Some(commit) = self
            .git
            .commit_all(&handle.path, &format!("Auto-save before merge: session {session_id}"))
            .await?
        {
            self.emit_commit(session_id, commit);
        }

        let message = format!("Merge session {session_id} ({})", handle.branch);
        let result = merge_branch(
            &self.git,
            &self.settings,
            &MergeRequest {
                repo_root,
                source_branch: &handle.branch,
                target_branch,
                strategy,
                message: &message,
            },
        )
        .await?;

        if let (true, Some(commit)) = (result.success, &result.merge_commit) {
            self.sink.emit(
                session_id,
                WorktreeEvent::Merged(WorktreeMergedPayload {
                    source_branch: handle.branch.clone(),
                    target_branch: target_branch.to_string(),
                    merge_commit: commit.clone(),
                    strategy: strategy.as_str().to_string(),
                }),
            );
        }
        Ok(result)
    }

    // ── Recovery ────────────────────────────────────────────────────────

    /// Reconcile worktrees under the base directory that no active session
    /// owns. A path outside git yields no results.
    #[instrument(skip(self, repo_path), fields(repo = %repo_path.display()))]
    pub async fn recover_orphaned_worktrees(&self, repo_path: &Path) -> Vec<RecoveryResult> {
        let repo_root = match self.git.repo_root(repo_path).await {
            Ok(root) => root,
            Err(e) => {
                debug!(error = %e, "skipping recovery");
                return Vec::new();
            }
        };

        let _gate = self.recovery_gate.write().await;
        let (active, recovered) = {
            let state = self.state.lock();
            let active: HashSet<String> =
                state.active.keys().map(|id| sanitize_session_id(id)).collect();
            (active, state.recovered.clone())
        };
        let results = recover_orphans(
            &self.git,
            &self.settings,
            &repo_root,
            &RecoveryScope {
                active,
                already_recovered: Some(&recovered),
            },
        )
        .await;

        let mut state = self.state.lock();
        for result in &results {
            if !result.deleted && result.error.is_none() {
                let _ = state.recovered.insert(result.path.clone());
            }
        }
        results
    }

    /// Worktrees git reports for the repository containing `repo_path`.
    pub async fn list_git_worktrees(&self, repo_path: &Path) -> Result<Vec<GitWorktreeEntry>> {
        let repo_root = self.git.repo_root(repo_path).await?;
        lifecycle::list_git_worktrees(&self.git, &repo_root).await
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use crate::test_support::{git_stdout, init_repo, write_file};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tron_settings::IsolationMode;

    fn settings(mode: IsolationMode) -> WorktreeSettings {
        WorktreeSettings {
            isolation_mode: mode,
            ..WorktreeSettings::default()
        }
    }

    fn with_channel(
        settings: WorktreeSettings,
    ) -> (WorktreeCoordinator, UnboundedReceiver<(String, WorktreeEvent)>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (WorktreeCoordinator::with_sink(settings, Arc::new(ChannelSink::new(tx))), rx)
    }

    fn drain(rx: &mut UnboundedReceiver<(String, WorktreeEvent)>) -> Vec<(String, WorktreeEvent)> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    fn canonical(path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap()
    }

    // ── Acquire ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn lazy_first_shares_second_isolates() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Lazy));

        let s1 = coord.acquire("s1", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert!(!s1.isolated);
        assert_eq!(s1.path, canonical(repo.path()));
        assert_eq!(s1.branch, "main");

        let s2 = coord.acquire("s2", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert!(s2.isolated);
        assert_ne!(s2.path, s1.path);
        assert_eq!(s2.branch, "session/s2");
        assert_eq!(s2.base_commit, s1.base_commit);
        assert!(s2.path.join(".git").exists());
    }

    #[tokio::test]
    async fn always_isolates_every_session() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Always));
        for id in ["a", "b"] {
            let h = coord.acquire(id, repo.path(), &AcquireOptions::default()).await.unwrap();
            assert!(h.isolated);
        }
        assert_eq!(coord.list_git_worktrees(repo.path()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn never_ignores_force() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Never));
        let opts = AcquireOptions {
            force_isolation: true,
            ..AcquireOptions::default()
        };
        for id in ["a", "b"] {
            assert!(!coord.acquire(id, repo.path(), &opts).await.unwrap().isolated);
        }
    }

    #[tokio::test]
    async fn acquire_is_idempotent() {
        let repo = init_repo();
        let (coord, mut rx) = with_channel(settings(IsolationMode::Always));
        let first = coord.acquire("s", repo.path(), &AcquireOptions::default()).await.unwrap();
        let second = coord.acquire("s", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn non_git_directory_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let (coord, mut rx) = with_channel(settings(IsolationMode::Always));
        let h = coord.acquire("s", dir.path(), &AcquireOptions::default()).await.unwrap();
        assert!(!h.isolated);
        assert_eq!(h.branch, NO_BRANCH);
        assert_eq!(h.path, dir.path());
        assert!(!h.is_git_backed());

        let events = drain(&mut rx);
        assert!(matches!(&events[0].1, WorktreeEvent::Acquired(p) if p.branch == "none" && !p.isolated));
    }

    #[tokio::test]
    async fn concurrent_lazy_acquires_have_one_owner() {
        let repo = init_repo();
        let coord = Arc::new(WorktreeCoordinator::new(settings(IsolationMode::Lazy)));
        let mut tasks = Vec::new();
        for i in 0..4 {
            let coord = Arc::clone(&coord);
            let path = repo.path().to_path_buf();
            tasks.push(tokio::spawn(async move {
                coord
                    .acquire(&format!("s{i}"), &path, &AcquireOptions::default())
                    .await
                    .unwrap()
            }));
        }
        let mut shared = 0;
        for task in tasks {
            if !task.await.unwrap().isolated {
                shared += 1;
            }
        }
        assert_eq!(shared, 1);
    }

    #[tokio::test]
    async fn lookalike_ids_get_separate_worktrees() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Always));
        let a = coord.acquire("team/x", repo.path(), &AcquireOptions::default()).await.unwrap();
        let b = coord.acquire("team:x", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert_ne!(a.path, b.path);
        assert_ne!(a.branch, b.branch);

        write_file(&a.path, "a.txt", "a\n");
        assert!(!b.path.join("a.txt").exists());

        coord.release("team/x", &ReleaseOptions::default()).await;
        assert!(!a.path.exists());
        assert!(b.path.join(".git").exists());
    }

    #[tokio::test]
    async fn fork_branches_from_parent_head() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Always));
        let parent = coord.acquire("p", repo.path(), &AcquireOptions::default()).await.unwrap();
        write_file(&parent.path, "p.txt", "parent\n");
        let commit = coord.commit("p", "parent work").await.unwrap().unwrap();

        let child = coord.fork("p", "c", repo.path()).await.unwrap();
        assert!(child.isolated);
        assert_eq!(child.base_commit, commit.hash);
        assert_eq!(child.parent_session_id.as_deref(), Some("p"));
        assert!(child.path.join("p.txt").exists());
    }

    #[tokio::test]
    async fn fork_under_lazy_isolates_even_without_owner() {
        let repo = init_repo();
        let (coord, mut rx) = with_channel(settings(IsolationMode::Lazy));
        let child = coord.fork("gone", "c", repo.path()).await.unwrap();
        assert!(child.isolated);
        let events = drain(&mut rx);
        assert!(matches!(
            &events[0].1,
            WorktreeEvent::Acquired(p) if p.forked_from.as_ref().is_some_and(|f| f.session_id == "gone")
        ));
    }

    // ── Release ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn release_commits_once_and_deletes() {
        let repo = init_repo();
        let (coord, mut rx) = with_channel(settings(IsolationMode::Always));
        let h = coord.acquire("s", repo.path(), &AcquireOptions::default()).await.unwrap();
        write_file(&h.path, "work.txt", "w\n");
        let before = git_stdout(repo.path(), &["rev-list", "--count", "session/s"]);

        coord
            .release(
                "s",
                &ReleaseOptions {
                    commit_message: Some("done".into()),
                    ..ReleaseOptions::default()
                },
            )
            .await;

        let after = git_stdout(repo.path(), &["rev-list", "--count", "session/s"]);
        assert_eq!(after.parse::<u32>().unwrap(), before.parse::<u32>().unwrap() + 1);
        assert_eq!(git_stdout(repo.path(), &["log", "-1", "--format=%s", "session/s"]), "done");
        assert!(!h.path.exists());
        assert!(coord.get("s").is_none());

        let events = drain(&mut rx);
        let kinds: Vec<_> = events.iter().map(|(_, e)| e.event_type()).collect();
        assert_eq!(
            kinds,
            vec![
                tron_events::EventType::WorktreeAcquired,
                tron_events::EventType::WorktreeCommit,
                tron_events::EventType::WorktreeReleased,
            ]
        );
        assert!(matches!(&events[2].1, WorktreeEvent::Released(p) if p.deleted && p.branch_preserved));
    }

    #[tokio::test]
    async fn release_can_drop_branch() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Always));
        coord.acquire("s", repo.path(), &AcquireOptions::default()).await.unwrap();
        coord
            .release(
                "s",
                &ReleaseOptions {
                    preserve_branch: Some(false),
                    ..ReleaseOptions::default()
                },
            )
            .await;
        assert!(!coord.git().branch_exists(repo.path(), "session/s").await.unwrap());
    }

    #[tokio::test]
    async fn release_unknown_is_noop() {
        let (coord, mut rx) = with_channel(settings(IsolationMode::Lazy));
        coord.release("ghost", &ReleaseOptions::default()).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn release_frees_main_directory() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Lazy));
        coord.acquire("s1", repo.path(), &AcquireOptions::default()).await.unwrap();
        coord.release("s1", &ReleaseOptions::default()).await;

        let s2 = coord.acquire("s2", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert!(!s2.isolated);
    }

    #[tokio::test]
    async fn release_without_auto_commit_keeps_dirty_worktree() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(WorktreeSettings {
            auto_commit_on_release: false,
            ..settings(IsolationMode::Always)
        });
        let h = coord.acquire("s", repo.path(), &AcquireOptions::default()).await.unwrap();
        write_file(&h.path, "wip.txt", "wip\n");
        coord.release("s", &ReleaseOptions::default()).await;
        assert!(h.path.join("wip.txt").exists());
        assert!(coord.get("s").is_none());
    }

    // ── Merge ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn merge_refused_for_shared_session() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Lazy));
        coord.acquire("s1", repo.path(), &AcquireOptions::default()).await.unwrap();
        let head = coord.git().head_commit(repo.path()).await.unwrap();

        let result = coord.merge_session("s1", "main", None).await.unwrap();
        assert!(!result.success);
        assert!(!result.conflicts.is_empty());
        assert!(result.merge_commit.is_none());
        assert_eq!(coord.git().head_commit(repo.path()).await.unwrap(), head);
    }

    #[tokio::test]
    async fn merge_unknown_session_errors() {
        let coord = WorktreeCoordinator::new(WorktreeSettings::default());
        let err = coord.merge_session("ghost", "main", None).await.unwrap_err();
        assert!(matches!(err, WorktreeError::SessionNotActive(id) if id == "ghost"));
    }

    #[tokio::test]
    async fn two_session_scenario() {
        let repo = init_repo();
        let (coord, mut rx) = with_channel(settings(IsolationMode::Lazy));

        let s1 = coord.acquire("s1", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert!(!s1.isolated);
        write_file(&s1.path, "s1.txt", "shared work\n");

        let s2 = coord.acquire("s2", repo.path(), &AcquireOptions::default()).await.unwrap();
        assert!(s2.isolated);
        assert_ne!(s2.path, s1.path);
        write_file(&s2.path, "feature.txt", "s2 work\n");
        coord.commit("s2", "s2 feature").await.unwrap().unwrap();

        let result = coord.merge_session("s2", "main", None).await.unwrap();
        assert!(result.success, "{result:?}");
        let merge_commit = result.merge_commit.unwrap();
        assert_eq!(git_stdout(repo.path(), &["rev-parse", "main"]), merge_commit);
        assert!(repo.path().join("feature.txt").exists());
        assert!(repo.path().join("s1.txt").exists());

        let merged: Vec<_> = drain(&mut rx)
            .into_iter()
            .filter(|(_, e)| matches!(e, WorktreeEvent::Merged(_)))
            .collect();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].0, "s2");
    }

    // ── Recovery / listing ──────────────────────────────────────────────

    #[tokio::test]
    async fn recovery_skips_active_and_is_idempotent() {
        let repo = init_repo();
        let old = WorktreeCoordinator::new(WorktreeSettings {
            delete_on_recovery: false,
            ..settings(IsolationMode::Always)
        });
        let orphan = old.acquire("crashed", repo.path(), &AcquireOptions::default()).await.unwrap();
        write_file(&orphan.path, "lost.txt", "lost\n");

        // A fresh coordinator, as after a restart.
        let coord = WorktreeCoordinator::new(WorktreeSettings {
            delete_on_recovery: false,
            ..settings(IsolationMode::Always)
        });
        coord.acquire("live", repo.path(), &AcquireOptions::default()).await.unwrap();

        let first = coord.recover_orphaned_worktrees(repo.path()).await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].session_id, "crashed");
        assert!(first[0].had_changes && first[0].committed && !first[0].deleted);

        let second = coord.recover_orphaned_worktrees(repo.path()).await;
        assert!(second.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn recovery_during_acquires_leaves_live_worktrees_alone() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let repo = init_repo();
        let coord = Arc::new(WorktreeCoordinator::new(settings(IsolationMode::Always)));
        let done = Arc::new(AtomicBool::new(false));

        let scanner = {
            let coord = Arc::clone(&coord);
            let done = Arc::clone(&done);
            let path = repo.path().to_path_buf();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while !done.load(Ordering::SeqCst) {
                    seen.extend(coord.recover_orphaned_worktrees(&path).await);
                    tokio::task::yield_now().await;
                }
                seen
            })
        };

        let mut tasks = Vec::new();
        for i in 0..12 {
            let coord = Arc::clone(&coord);
            let path = repo.path().to_path_buf();
            tasks.push(tokio::spawn(async move {
                coord
                    .acquire(&format!("s{i}"), &path, &AcquireOptions::default())
                    .await
                    .unwrap()
            }));
        }
        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }
        done.store(true, Ordering::SeqCst);
        let recovered = scanner.await.unwrap();

        assert!(recovered.is_empty(), "live worktrees recovered: {recovered:?}");
        for handle in &handles {
            assert!(handle.path.join(".git").exists(), "{} lost its directory", handle.session_id);
            assert!(coord.get(&handle.session_id).is_some());
        }
    }

    #[tokio::test]
    async fn recovery_outside_git_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let coord = WorktreeCoordinator::new(WorktreeSettings::default());
        assert!(coord.recover_orphaned_worktrees(dir.path()).await.is_empty());
    }

    #[tokio::test]
    async fn list_and_status() {
        let repo = init_repo();
        let coord = WorktreeCoordinator::new(settings(IsolationMode::Always));
        coord.acquire("b", repo.path(), &AcquireOptions::default()).await.unwrap();
        let a = coord.acquire("a", repo.path(), &AcquireOptions::default()).await.unwrap();

        let ids: Vec<_> = coord.list_worktrees().into_iter().map(|h| h.session_id).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let status = coord.get_status("a").await.unwrap().unwrap();
        assert!(!status.has_uncommitted_changes);
        write_file(&a.path, "x.txt", "x");
        let status = coord.get_status("a").await.unwrap().unwrap();
        assert!(status.has_uncommitted_changes);
        assert_eq!(status.current_commit.as_deref(), Some(a.base_commit.as_str()));
        assert!(coord.get_status("zzz").await.unwrap().is_none());
        assert!(coord.commit("zzz", "m").await.is_err());
    }
}
