//! Session manager: create, resume, end, fork, rewind and list sessions, and
//! hand each one a working directory.
//!
//! The event store stays the source of truth. Reconstructed state is cached
//! per session in a `DashMap` and dropped whenever the manager appends, so
//! the next read replays the log again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use tron_events::types::payloads::context::{
    CompactBoundaryPayload, CompactSummaryPayload, ContextClearedPayload,
};
use tron_events::{
    AppendOptions, EventStore, EventType, ForkOptions, ListSessionsOptions, Session, SessionEvent,
    SessionSummary,
};
use tron_settings::{MergeStrategy, WorktreeSettings};
use tron_worktree::{
    AcquireOptions, EventStoreSink, MergeResult, RecoveryResult, ReleaseOptions, WorkingDirectory,
    WorktreeCoordinator,
};

use crate::errors::{Result, RuntimeError};

/// Result of a session fork.
#[derive(Clone, Debug)]
pub struct ForkSessionResult {
    /// The new session.
    pub session: SessionSummary,
    /// Its `session.fork` root event.
    pub fork_event: SessionEvent,
    /// Isolated worktree for the fork, when the parent held a git-backed one.
    pub working_directory: Option<WorkingDirectory>,
}

/// Filter for listing sessions.
#[derive(Clone, Debug, Default)]
pub struct SessionFilter {
    /// Only sessions whose workspace is this path.
    pub workspace_path: Option<String>,
    /// Include ended sessions.
    pub include_ended: bool,
    /// Only forks of this session.
    pub parent_session_id: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// An externally produced context compaction.
#[derive(Clone, Debug, Default)]
pub struct CompactionRecord {
    /// Summary text replacing the compacted history.
    pub summary: String,
    /// Token estimate before compaction.
    pub original_tokens: i64,
    /// Token estimate after compaction.
    pub compacted_tokens: i64,
    /// Files touched in the compacted range.
    pub files_modified: Option<Vec<String>>,
}

/// Composes the event store and the worktree coordinator per session.
pub struct SessionManager {
    event_store: Arc<EventStore>,
    worktrees: Arc<WorktreeCoordinator>,
    active_sessions: DashMap<String, Arc<Session>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("active_sessions", &self.active_sessions.len())
            .field("worktrees", &self.worktrees)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Manager whose coordinator records worktree events into `event_store`.
    pub fn new(event_store: Arc<EventStore>, worktree_settings: WorktreeSettings) -> Self {
        let sink = Arc::new(EventStoreSink::new(Arc::clone(&event_store)));
        let worktrees = Arc::new(WorktreeCoordinator::with_sink(worktree_settings, sink));
        Self::with_coordinator(event_store, worktrees)
    }

    /// Manager over an existing coordinator.
    pub fn with_coordinator(event_store: Arc<EventStore>, worktrees: Arc<WorktreeCoordinator>) -> Self {
        Self {
            event_store,
            worktrees,
            active_sessions: DashMap::new(),
        }
    }

    /// The event store.
    pub fn event_store(&self) -> &Arc<EventStore> {
        &self.event_store
    }

    /// The worktree coordinator.
    pub fn worktrees(&self) -> &Arc<WorktreeCoordinator> {
        &self.worktrees
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Create a session; its `session.start` is sequence 0.
    #[instrument(skip(self, title))]
    pub fn create_session(
        &self,
        model: &str,
        working_directory: &str,
        title: Option<&str>,
    ) -> Result<SessionSummary> {
        let created = self
            .event_store
            .create_session(model, working_directory, title)?;
        debug!(session_id = %created.session.id, "session created");
        Ok(created.session)
    }

    /// Acquire a working directory for an existing session.
    ///
    /// `repo_path` defaults to the session's recorded working directory.
    #[instrument(skip(self, repo_path, options))]
    pub async fn acquire_workspace(
        &self,
        session_id: &str,
        repo_path: Option<&Path>,
        options: &AcquireOptions,
    ) -> Result<WorkingDirectory> {
        let summary = self.summary(session_id)?;
        let path = repo_path.map_or_else(|| PathBuf::from(&summary.working_directory), Path::to_path_buf);
        let handle = self.worktrees.acquire(session_id, &path, options).await?;
        self.invalidate_session(session_id);
        Ok(handle)
    }

    /// End a session: release its working directory (best effort), then
    /// append `session.end`.
    #[instrument(skip(self, commit_message))]
    pub async fn end_session(
        &self,
        session_id: &str,
        reason: &str,
        commit_message: Option<String>,
    ) -> Result<SessionEvent> {
        let _ = self.summary(session_id)?;
        self.worktrees
            .release(
                session_id,
                &ReleaseOptions {
                    commit_message,
                    ..ReleaseOptions::default()
                },
            )
            .await;
        let event = self.event_store.end_session(session_id, reason)?;
        self.invalidate_session(session_id);
        debug!(session_id, "session ended");
        Ok(event)
    }

    /// Fork a session's history at `from_sequence` (latest when `None`).
    ///
    /// When the parent holds a git-backed directory the child also gets an
    /// isolated worktree branched from the parent's current commit. A
    /// worktree failure leaves the fork in place without a directory.
    #[instrument(skip(self, title))]
    pub async fn fork_session(
        &self,
        session_id: &str,
        from_sequence: Option<i64>,
        title: Option<String>,
    ) -> Result<ForkSessionResult> {
        let forked = self
            .event_store
            .fork(
                session_id,
                &ForkOptions {
                    from_sequence,
                    title,
                    model: None,
                },
            )
            .map_err(RuntimeError::from_store)?;
        let child_id = forked.session.id.clone();

        let parent_dir = self
            .worktrees
            .get(session_id)
            .and_then(|handle| handle.repo_root);
        let working_directory = match parent_dir {
            Some(repo_root) => match self.worktrees.fork(session_id, &child_id, &repo_root).await {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(child_id, error = %e, "fork worktree acquisition failed");
                    None
                }
            },
            None => None,
        };

        debug!(child_id, "session forked");
        Ok(ForkSessionResult {
            session: forked.session,
            fork_event: forked.fork_event,
            working_directory,
        })
    }

    /// Rewind visible history to `to_sequence`. Worktree state is untouched.
    #[instrument(skip(self))]
    pub fn rewind_session(&self, session_id: &str, to_sequence: i64) -> Result<Arc<Session>> {
        let session = Arc::new(
            self.event_store
                .rewind(session_id, to_sequence)
                .map_err(RuntimeError::from_store)?,
        );
        let _ = self
            .active_sessions
            .insert(session_id.to_owned(), Arc::clone(&session));
        Ok(session)
    }

    /// Delete a session's log, then release its directory.
    ///
    /// A refused delete (forks still share the history) leaves the session
    /// and its working directory untouched.
    pub async fn delete_session(&self, session_id: &str) -> Result<bool> {
        let deleted = self.event_store.delete_session(session_id)?;
        self.invalidate_session(session_id);
        self.worktrees.release(session_id, &ReleaseOptions::default()).await;
        Ok(deleted)
    }

    // ── State ──────────────────────────────────────────────────────────

    /// Current state, from cache or by replaying the log.
    #[instrument(skip(self))]
    pub fn resume_session(&self, session_id: &str) -> Result<Arc<Session>> {
        if let Some(existing) = self.active_sessions.get(session_id) {
            return Ok(Arc::clone(existing.value()));
        }
        let session = Arc::new(
            self.event_store
                .reconstruct(session_id, None)
                .map_err(RuntimeError::from_store)?,
        );
        let _ = self
            .active_sessions
            .insert(session_id.to_owned(), Arc::clone(&session));
        debug!(session_id, head = session.head_sequence, "session resumed");
        Ok(session)
    }

    /// State at `as_of` (inclusive), or the current state. Point-in-time
    /// views are not cached.
    pub fn get_state(&self, session_id: &str, as_of: Option<i64>) -> Result<Arc<Session>> {
        match as_of {
            None => self.resume_session(session_id),
            Some(seq) => Ok(Arc::new(
                self.event_store
                    .reconstruct(session_id, Some(seq))
                    .map_err(RuntimeError::from_store)?,
            )),
        }
    }

    /// Listing row of a session.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        Ok(self.event_store.get_session(session_id)?)
    }

    /// List sessions, newest activity first.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionSummary>> {
        let workspace_id = match &filter.workspace_path {
            Some(path) => {
                let found = self
                    .event_store
                    .list_workspaces()?
                    .into_iter()
                    .find(|ws| &ws.path == path);
                match found {
                    Some(ws) => Some(ws.id),
                    None => return Ok(Vec::new()),
                }
            }
            None => None,
        };
        let opts = ListSessionsOptions {
            workspace_id,
            ended: if filter.include_ended { None } else { Some(false) },
            parent_session_id: filter.parent_session_id.clone(),
            limit: filter.limit.and_then(|l| i64::try_from(l).ok()),
            offset: None,
        };
        Ok(self.event_store.list_sessions(&opts)?)
    }

    // ── Appends ────────────────────────────────────────────────────────

    /// Append a conversation event.
    pub fn append_event(&self, session_id: &str, event_type: EventType, payload: Value) -> Result<SessionEvent> {
        let event = self
            .event_store
            .append(&AppendOptions {
                session_id,
                event_type,
                payload,
            })
            .map_err(RuntimeError::from_store)?;
        self.invalidate_session(session_id);
        Ok(event)
    }

    /// Append `context.cleared`; later replays start after it.
    #[instrument(skip(self))]
    pub fn clear_context(&self, session_id: &str, reason: &str) -> Result<SessionEvent> {
        let tokens_before = self.resume_session(session_id)?.token_usage.input_tokens;
        let payload = serde_json::to_value(ContextClearedPayload {
            reason: reason.to_owned(),
            tokens_before,
        })
        .map_err(tron_events::EventStoreError::from)?;
        self.append_event(session_id, EventType::ContextCleared, payload)
    }

    /// Record a compaction as a `compact.boundary` / `compact.summary` pair
    /// spanning the whole visible history.
    #[instrument(skip(self, record))]
    pub fn record_compaction(
        &self,
        session_id: &str,
        record: &CompactionRecord,
    ) -> Result<(SessionEvent, SessionEvent)> {
        let summary = self.summary(session_id)?;
        let state = self.resume_session(session_id)?;
        let from_event_id = state
            .messages
            .first()
            .and_then(|m| m.event_ids.iter().flatten().next().cloned())
            .or(summary.root_event_id)
            .unwrap_or_default();

        let boundary = serde_json::to_value(CompactBoundaryPayload {
            from_event_id,
            to_event_id: state.head_event_id.clone(),
            original_tokens: record.original_tokens,
            compacted_tokens: record.compacted_tokens,
        })
        .map_err(tron_events::EventStoreError::from)?;
        let boundary = self.append_event(session_id, EventType::CompactBoundary, boundary)?;

        let summary = serde_json::to_value(CompactSummaryPayload {
            summary: record.summary.clone(),
            boundary_event_id: boundary.id.clone(),
            files_modified: record.files_modified.clone(),
        })
        .map_err(tron_events::EventStoreError::from)?;
        let summary = self.append_event(session_id, EventType::CompactSummary, summary)?;
        Ok((boundary, summary))
    }

    // ── Worktrees ──────────────────────────────────────────────────────

    /// Merge the session's isolated branch into `target_branch`.
    pub async fn merge_session(
        &self,
        session_id: &str,
        target_branch: &str,
        strategy: Option<MergeStrategy>,
    ) -> Result<MergeResult> {
        let result = self
            .worktrees
            .merge_session(session_id, target_branch, strategy)
            .await?;
        self.invalidate_session(session_id);
        Ok(result)
    }

    /// Reconcile orphaned worktrees of the repository at `repo_path`.
    pub async fn recover_orphaned_worktrees(&self, repo_path: &Path) -> Vec<RecoveryResult> {
        self.worktrees.recover_orphaned_worktrees(repo_path).await
    }

    /// Active working directories.
    pub fn list_worktrees(&self) -> Vec<WorkingDirectory> {
        self.worktrees.list_worktrees()
    }

    // ── Cache ──────────────────────────────────────────────────────────

    /// Whether state for `session_id` is cached.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.active_sessions.contains_key(session_id)
    }

    /// Number of cached sessions.
    pub fn active_count(&self) -> usize {
        self.active_sessions.len()
    }

    /// Drop cached state; the next read replays the log.
    pub fn invalidate_session(&self, session_id: &str) {
        let _ = self.active_sessions.remove(session_id);
    }

    fn summary(&self, session_id: &str) -> Result<SessionSummary> {
        self.event_store
            .get_session(session_id)?
            .ok_or_else(|| RuntimeError::SessionNotFound(session_id.to_owned()))
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::process::Command;
    use tron_events::EventRange;
    use tron_settings::IsolationMode;

    fn make_manager(mode: IsolationMode) -> SessionManager {
        let store = Arc::new(EventStore::open_in_memory().unwrap());
        SessionManager::new(
            store,
            WorktreeSettings {
                isolation_mode: mode,
                ..WorktreeSettings::default()
            },
        )
    }

    fn init_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for args in [
            &["init", "-q"][..],
            &["symbolic-ref", "HEAD", "refs/heads/main"],
            &["config", "user.name", "Test"],
            &["config", "user.email", "test@example.com"],
            &["config", "commit.gpgsign", "false"],
            &["commit", "-q", "--allow-empty", "-m", "initial"],
        ] {
            assert!(Command::new("git").args(args).current_dir(dir.path()).status().unwrap().success());
        }
        dir
    }

    fn types(mgr: &SessionManager, id: &str) -> Vec<EventType> {
        mgr.event_store()
            .get_events(id, &EventRange::default())
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }

    fn user(text: &str) -> Value {
        json!({"content": text})
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    #[test]
    fn create_and_resume() {
        let mgr = make_manager(IsolationMode::Lazy);
        let s = mgr.create_session("test-model", "/tmp/project", Some("test")).unwrap();
        assert!(!mgr.is_active(&s.id));

        let state = mgr.resume_session(&s.id).unwrap();
        assert_eq!(state.model, "test-model");
        assert_eq!(state.head_sequence, 0);
        assert!(mgr.is_active(&s.id));

        let again = mgr.resume_session(&s.id).unwrap();
        assert!(Arc::ptr_eq(&state, &again));
    }

    #[test]
    fn append_invalidates_cache() {
        let mgr = make_manager(IsolationMode::Lazy);
        let s = mgr.create_session("m", "/tmp", None).unwrap();
        mgr.resume_session(&s.id).unwrap();

        mgr.append_event(&s.id, EventType::MessageUser, user("hello")).unwrap();
        assert!(!mgr.is_active(&s.id));
        assert_eq!(mgr.resume_session(&s.id).unwrap().messages.len(), 1);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let mgr = make_manager(IsolationMode::Lazy);
        assert!(matches!(mgr.resume_session("nope"), Err(RuntimeError::SessionNotFound(_))));
        assert!(matches!(
            mgr.append_event("nope", EventType::MessageUser, user("x")),
            Err(RuntimeError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn end_session_outside_git() {
        let mgr = make_manager(IsolationMode::Lazy);
        let dir = tempfile::tempdir().unwrap();
        let s = mgr
            .create_session("m", &dir.path().to_string_lossy(), None)
            .unwrap();
        let wd = mgr.acquire_workspace(&s.id, None, &AcquireOptions::default()).await.unwrap();
        assert_eq!(wd.branch, tron_worktree::NO_BRANCH);

        mgr.end_session(&s.id, "completed", None).await.unwrap();
        assert_eq!(
            types(&mgr, &s.id),
            vec![
                EventType::SessionStart,
                EventType::WorktreeAcquired,
                EventType::WorktreeReleased,
                EventType::SessionEnd,
            ]
        );
        assert!(!mgr.resume_session(&s.id).unwrap().is_active);
        assert!(mgr.worktrees().get(&s.id).is_none());
    }

    #[tokio::test]
    async fn acquire_requires_session() {
        let mgr = make_manager(IsolationMode::Lazy);
        let err = mgr
            .acquire_workspace("ghost", Some(Path::new("/tmp")), &AcquireOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::SessionNotFound(_)));
    }

    // ── Fork / rewind ──────────────────────────────────────────────────

    #[tokio::test]
    async fn fork_with_worktree() {
        let repo = init_repo();
        let mgr = make_manager(IsolationMode::Lazy);
        let repo_path = repo.path().to_string_lossy().into_owned();
        let parent = mgr.create_session("m", &repo_path, None).unwrap();
        let shared = mgr
            .acquire_workspace(&parent.id, None, &AcquireOptions::default())
            .await
            .unwrap();
        assert!(!shared.isolated);
        mgr.append_event(&parent.id, EventType::MessageUser, user("hi")).unwrap();

        let fork = mgr.fork_session(&parent.id, None, Some("child".into())).await.unwrap();
        let wd = fork.working_directory.unwrap();
        assert!(wd.isolated);
        assert_eq!(wd.base_commit, shared.base_commit);
        assert_eq!(fork.session.parent_session_id.as_deref(), Some(parent.id.as_str()));

        let child = mgr.resume_session(&fork.session.id).unwrap();
        assert_eq!(child.messages.len(), 1);
        assert!(child.worktree.as_ref().is_some_and(|w| w.isolated));
    }

    #[tokio::test]
    async fn refused_delete_keeps_worktree() {
        let repo = init_repo();
        let mgr = make_manager(IsolationMode::Always);
        let repo_path = repo.path().to_string_lossy().into_owned();
        let parent = mgr.create_session("m", &repo_path, None).unwrap();
        let wd = mgr
            .acquire_workspace(&parent.id, None, &AcquireOptions::default())
            .await
            .unwrap();
        let fork = mgr.fork_session(&parent.id, None, None).await.unwrap();
        let child_dir = fork.working_directory.unwrap().path;

        assert!(mgr.delete_session(&parent.id).await.is_err());
        assert!(mgr.worktrees().get(&parent.id).is_some());
        assert!(wd.path.join(".git").exists());
        assert!(mgr.get_session(&parent.id).unwrap().is_some());

        assert!(mgr.delete_session(&fork.session.id).await.unwrap());
        assert!(mgr.worktrees().get(&fork.session.id).is_none());
        assert!(!child_dir.exists());

        assert!(mgr.delete_session(&parent.id).await.unwrap());
        assert!(mgr.worktrees().get(&parent.id).is_none());
        assert!(!wd.path.exists());
    }

    #[tokio::test]
    async fn fork_without_worktree() {
        let mgr = make_manager(IsolationMode::Lazy);
        let parent = mgr.create_session("m", "/tmp", None).unwrap();
        let fork = mgr.fork_session(&parent.id, Some(0), None).await.unwrap();
        assert!(fork.working_directory.is_none());
        assert_eq!(fork.fork_event.event_type, EventType::SessionFork);
    }

    #[test]
    fn rewind_updates_cache() {
        let mgr = make_manager(IsolationMode::Lazy);
        let s = mgr.create_session("m", "/tmp", None).unwrap();
        mgr.append_event(&s.id, EventType::MessageUser, user("one")).unwrap();
        mgr.append_event(&s.id, EventType::MessageUser, user("two")).unwrap();

        // Consecutive user messages merge, so count their source events.
        let rewound = mgr.rewind_session(&s.id, 1).unwrap();
        assert_eq!(rewound.messages[0].event_ids.len(), 1);
        assert!(Arc::ptr_eq(&rewound, &mgr.resume_session(&s.id).unwrap()));
        assert_eq!(mgr.get_state(&s.id, Some(2)).unwrap().messages[0].event_ids.len(), 2);
    }

    // ── Context ────────────────────────────────────────────────────────

    #[test]
    fn clear_context_empties_messages() {
        let mgr = make_manager(IsolationMode::Lazy);
        let s = mgr.create_session("m", "/tmp", None).unwrap();
        mgr.append_event(&s.id, EventType::MessageUser, user("old")).unwrap();
        mgr.clear_context(&s.id, "manual").unwrap();
        mgr.append_event(&s.id, EventType::MessageUser, user("new")).unwrap();

        let state = mgr.resume_session(&s.id).unwrap();
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn compaction_replaces_history_with_summary() {
        let mgr = make_manager(IsolationMode::Lazy);
        let s = mgr.create_session("m", "/tmp", None).unwrap();
        mgr.append_event(&s.id, EventType::MessageUser, user("long")).unwrap();

        let (boundary, summary) = mgr
            .record_compaction(
                &s.id,
                &CompactionRecord {
                    summary: "we talked".into(),
                    original_tokens: 100,
                    compacted_tokens: 10,
                    files_modified: None,
                },
            )
            .unwrap();
        assert_eq!(summary.payload["boundaryEventId"], boundary.id.as_str());

        let state = mgr.resume_session(&s.id).unwrap();
        assert_eq!(state.messages.len(), 2);
        assert!(state.messages[0].message.content.to_string().contains("we talked"));
    }

    // ── Listing ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn list_filters_by_workspace_and_end() {
        let mgr = make_manager(IsolationMode::Lazy);
        let a = mgr.create_session("m", "/tmp/a", None).unwrap();
        mgr.create_session("m", "/tmp/b", None).unwrap();

        let only_a = mgr
            .list_sessions(&SessionFilter {
                workspace_path: Some("/tmp/a".into()),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].id, a.id);

        let none = mgr
            .list_sessions(&SessionFilter {
                workspace_path: Some("/elsewhere".into()),
                ..SessionFilter::default()
            })
            .unwrap();
        assert!(none.is_empty());

        mgr.end_session(&a.id, "completed", None).await.unwrap();
        assert_eq!(mgr.list_sessions(&SessionFilter::default()).unwrap().len(), 1);
        let all = mgr
            .list_sessions(&SessionFilter {
                include_ended: true,
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(all.len(), 2);
    }
}
