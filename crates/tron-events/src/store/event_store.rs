//! The transactional, session-centric [`EventStore`].
//!
//! Writes to one session are serialized twice: by an in-process lock per
//! session and by an `IMMEDIATE` transaction that re-reads the head before
//! allocating the next sequence. Cross-session writes (create, fork, delete)
//! also take the global lock, always before any session lock. Reads take no
//! lock; each runs in a deferred transaction and sees one WAL snapshot.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use tron_core::retry::calculate_linear_delay_with_random;
use tron_core::{EventId, SessionId};
use tron_settings::EventStoreSettings;

use crate::errors::{EventStoreError, Result};
use crate::reconstruct::reconstruct_session;
use crate::sqlite::connection::{
    new_file, new_in_memory, ConnectionConfig, ConnectionPool, PooledConnection,
};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::event::{EventRange, EventRepo};
use crate::sqlite::repositories::search::{SearchOptions, SearchRepo};
use crate::sqlite::repositories::session::{
    CounterDelta, CreateSessionOptions, ListSessionsOptions, SessionRepo,
};
use crate::sqlite::repositories::workspace::WorkspaceRepo;
use crate::sqlite::row_types::{rows_into_events, EventRow, SessionRow};
use crate::types::payloads::message::MessageDeletedPayload;
use crate::types::payloads::session::{
    SessionEndPayload, SessionForkPayload, SessionRewindPayload, SessionStartPayload,
};
use crate::types::state::{SearchResult, Session, SessionSummary, Workspace};
use crate::types::{EventType, SessionEvent, TokenUsage};

const BUSY_RETRY_ATTEMPTS: u32 = 32;
const BUSY_STEP_MS: u64 = 10;
const BUSY_MAX_DELAY_MS: u64 = 500;
const BUSY_JITTER: f64 = 0.25;
const LOCK_PRUNE_THRESHOLD: usize = 128;

/// Options for appending an event. The store assigns id, sequence, parent
/// and timestamp.
#[derive(Clone, Debug)]
pub struct AppendOptions<'a> {
    /// Session to append to.
    pub session_id: &'a str,
    /// Event type.
    pub event_type: EventType,
    /// Event payload.
    pub payload: Value,
}

/// Options for forking a session.
#[derive(Clone, Debug, Default)]
pub struct ForkOptions {
    /// Last inherited sequence; defaults to the source's latest.
    pub from_sequence: Option<i64>,
    /// Title for the new session.
    pub title: Option<String>,
    /// Model override for the new session.
    pub model: Option<String>,
}

/// Result of creating a session.
#[derive(Clone, Debug)]
pub struct CreateSessionResult {
    /// Listing row of the new session.
    pub session: SessionSummary,
    /// The `session.start` event at sequence 0.
    pub root_event: SessionEvent,
}

/// Result of forking a session.
#[derive(Clone, Debug)]
pub struct ForkResult {
    /// Listing row of the new session.
    pub session: SessionSummary,
    /// The `session.fork` event at sequence 0.
    pub fork_event: SessionEvent,
}

/// Append-only session event store over a `SQLite` connection pool.
pub struct EventStore {
    pool: ConnectionPool,
    conflict_retries: u32,
    session_locks: SessionLocks,
    global_lock: Mutex<()>,
}

impl EventStore {
    /// Wrap an already-migrated pool with default settings.
    pub fn new(pool: ConnectionPool) -> Self {
        Self::with_settings(pool, &EventStoreSettings::default())
    }

    /// Wrap an already-migrated pool.
    pub fn with_settings(pool: ConnectionPool, settings: &EventStoreSettings) -> Self {
        Self {
            pool,
            conflict_retries: settings.sequence_conflict_retries,
            session_locks: SessionLocks::default(),
            global_lock: Mutex::new(()),
        }
    }

    /// Open (creating if needed) a file-backed store and apply migrations.
    pub fn open(path: &Path, settings: &EventStoreSettings) -> Result<Self> {
        let pool = new_file(path, &ConnectionConfig::from(settings))?;
        migrate(&pool)?;
        info!(path = %path.display(), "event store opened");
        Ok(Self::with_settings(pool, settings))
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let pool = new_in_memory(&ConnectionConfig::default())?;
        migrate(&pool)?;
        Ok(Self::new(pool))
    }

    /// Underlying pool.
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────

    /// Create a session with its `session.start` at sequence 0. The
    /// workspace for `working_directory` is created on first use.
    #[instrument(skip(self))]
    pub fn create_session(
        &self,
        model: &str,
        working_directory: &str,
        title: Option<&str>,
    ) -> Result<CreateSessionResult> {
        let _global = self.lock_global()?;
        let session_id = SessionId::new().into_inner();
        let payload = serde_json::to_value(SessionStartPayload {
            working_directory: working_directory.to_string(),
            model: model.to_string(),
            provider: None,
            system_prompt: None,
            title: title.map(String::from),
            tags: None,
        })?;

        let root_event = self.write(|conn| {
            let row = resolve_session(conn, &session_id, EventType::SessionStart, &payload)?;
            insert_next(conn, &row, EventType::SessionStart, payload.clone(), None)
        })?;
        let session = self
            .get_session(&session_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(session_id.clone()))?;
        info!(session_id = %session.id, workspace_id = %session.workspace_id, "session created");
        Ok(CreateSessionResult {
            session,
            root_event,
        })
    }

    /// Append an event after the session's current head.
    ///
    /// A `session.start` on an unknown id creates the session. Anything else
    /// on an unknown id is `SessionNotFound`. `session.fork` and
    /// `session.rewind` are written only by [`Self::fork`] and [`Self::rewind`].
    #[instrument(skip(self, opts), fields(session_id = %opts.session_id, event_type = %opts.event_type))]
    pub fn append(&self, opts: &AppendOptions<'_>) -> Result<SessionEvent> {
        match opts.event_type {
            EventType::Unrecognized => {
                return Err(EventStoreError::InvalidOperation(
                    "cannot append an unrecognized event type".into(),
                ));
            }
            EventType::SessionFork | EventType::SessionRewind => {
                return Err(EventStoreError::InvalidOperation(format!(
                    "{} events are written by the store itself",
                    opts.event_type
                )));
            }
            _ => {}
        }

        let _global = if opts.event_type == EventType::SessionStart {
            Some(self.lock_global()?)
        } else {
            None
        };
        let lock = self.session_locks.get(opts.session_id)?;
        let _guard = lock.lock().map_err(|_| poisoned("session"))?;

        let event = self.write(|conn| {
            let row = resolve_session(conn, opts.session_id, opts.event_type, &opts.payload)?;
            insert_next(conn, &row, opts.event_type, opts.payload.clone(), None)
        })?;
        debug!(sequence = event.sequence, event_id = %event.id, "event appended");
        Ok(event)
    }

    /// Start a new session whose history is the source's chain up to
    /// `from_sequence`. The source is never written.
    #[instrument(skip(self, opts), fields(source = %session_id))]
    pub fn fork(&self, session_id: &str, opts: &ForkOptions) -> Result<ForkResult> {
        let _global = self.lock_global()?;
        let (source_row, source_event) = self.read(|conn| {
            let event = resolve_at(conn, session_id, opts.from_sequence)?;
            let row = SessionRepo::get_by_id(conn, session_id)?
                .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))?;
            Ok((row, event))
        })?;

        let child_id = SessionId::new().into_inner();
        let tags: Vec<String> = serde_json::from_str(&source_row.tags).unwrap_or_default();
        let payload = serde_json::to_value(SessionForkPayload {
            source_session_id: session_id.to_string(),
            source_event_id: source_event.id.clone(),
            source_sequence: source_event.sequence,
            name: opts.title.clone(),
            model: opts.model.clone(),
        })?;

        let fork_event = self.write(|conn| {
            SessionRepo::create(
                conn,
                &CreateSessionOptions {
                    id: &child_id,
                    workspace_id: &source_row.workspace_id,
                    model: opts.model.as_deref().unwrap_or(&source_row.latest_model),
                    working_directory: &source_row.working_directory,
                    title: opts.title.as_deref().or(source_row.title.as_deref()),
                    tags: &tags,
                    parent_session_id: Some(session_id),
                    fork_from_event_id: Some(&source_event.id),
                    created_at: &now(),
                },
            )?;
            let child = SessionRepo::get_by_id(conn, &child_id)?
                .ok_or_else(|| EventStoreError::SessionNotFound(child_id.clone()))?;
            insert_next(
                conn,
                &child,
                EventType::SessionFork,
                payload.clone(),
                Some(source_event.id.clone()),
            )
        })?;

        let session = self
            .get_session(&child_id)?
            .ok_or_else(|| EventStoreError::SessionNotFound(child_id.clone()))?;
        info!(
            child = %child_id,
            from_sequence = source_event.sequence,
            "session forked"
        );
        Ok(ForkResult {
            session,
            fork_event,
        })
    }

    /// Hide everything after `to_sequence` by appending a `session.rewind`
    /// marker whose parent is the event at `to_sequence`. Returns the
    /// projection at the marker.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn rewind(&self, session_id: &str, to_sequence: i64) -> Result<Session> {
        let lock = self.session_locks.get(session_id)?;
        let _guard = lock.lock().map_err(|_| poisoned("session"))?;

        let marker = self.write(|conn| {
            let target = resolve_at(conn, session_id, Some(to_sequence))?;
            let row = SessionRepo::get_by_id(conn, session_id)?
                .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))?;
            let from_sequence = EventRepo::latest_sequence(conn, session_id)?.unwrap_or(to_sequence);
            let payload = serde_json::to_value(SessionRewindPayload {
                to_sequence,
                to_event_id: target.id.clone(),
                from_sequence,
            })?;
            insert_next(conn, &row, EventType::SessionRewind, payload, Some(target.id))
        })?;

        let session = self.reconstruct(session_id, Some(marker.sequence))?;
        if session.is_active {
            let _ = self.write(|conn| {
                let ended = SessionRepo::get_by_id(conn, session_id)?
                    .is_some_and(|row| row.ended_at.is_some());
                if ended {
                    let _ = SessionRepo::clear_ended(conn, session_id)?;
                }
                Ok(ended)
            })?;
        }
        info!(to_sequence, marker_sequence = marker.sequence, "session rewound");
        Ok(session)
    }

    /// Soft-delete a message or tool result by appending `message.deleted`.
    pub fn delete_message(
        &self,
        session_id: &str,
        target_event_id: &str,
        reason: Option<&str>,
    ) -> Result<SessionEvent> {
        let target = self
            .get_event(target_event_id)?
            .ok_or_else(|| EventStoreError::EventNotFound(target_event_id.to_string()))?;
        if !target.event_type.is_deletable() {
            return Err(EventStoreError::InvalidOperation(format!(
                "cannot delete {} events",
                target.event_type
            )));
        }
        let payload = serde_json::to_value(MessageDeletedPayload {
            target_event_id: target.id,
            target_type: target.event_type.as_str().to_string(),
            reason: reason.map(String::from),
        })?;
        self.append(&AppendOptions {
            session_id,
            event_type: EventType::MessageDeleted,
            payload,
        })
    }

    /// Append `session.end`; the listing row is marked ended.
    pub fn end_session(&self, session_id: &str, reason: &str) -> Result<SessionEvent> {
        let payload = serde_json::to_value(SessionEndPayload {
            reason: reason.to_string(),
            summary: None,
            total_token_usage: None,
        })?;
        self.append(&AppendOptions {
            session_id,
            event_type: EventType::SessionEnd,
            payload,
        })
    }

    /// Delete a session and its events. Refused while forks still point
    /// into its history.
    #[instrument(skip(self))]
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let _global = self.lock_global()?;
        let lock = self.session_locks.get(session_id)?;
        let _guard = lock.lock().map_err(|_| poisoned("session"))?;
        let deleted = self.write(|conn| {
            let forks = SessionRepo::count_forks(conn, session_id)?;
            if forks > 0 {
                return Err(EventStoreError::InvalidOperation(format!(
                    "session {session_id} has {forks} fork(s) sharing its history"
                )));
            }
            SessionRepo::delete(conn, session_id)
        })?;
        if deleted {
            info!(session_id, "session deleted");
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// The session's own events in sequence order.
    pub fn get_events(&self, session_id: &str, range: &EventRange) -> Result<Vec<SessionEvent>> {
        self.read(|conn| {
            if !SessionRepo::exists(conn, session_id)? {
                return Err(EventStoreError::SessionNotFound(session_id.to_string()));
            }
            rows_into_events(EventRepo::get_range(conn, session_id, range)?)
        })
    }

    /// Project the session as of `as_of` (default: latest sequence) by
    /// folding the ancestor chain of that event.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub fn reconstruct(&self, session_id: &str, as_of: Option<i64>) -> Result<Session> {
        let chain = self.read(|conn| {
            let target = resolve_at(conn, session_id, as_of)?;
            rows_into_events(EventRepo::get_ancestors(conn, &target.id)?)
        })?;
        for event in chain.iter().filter(|e| !e.verify_checksum()) {
            warn!(event_id = %event.id, sequence = event.sequence, "event checksum mismatch");
        }
        reconstruct_session(session_id, &chain).ok_or_else(|| {
            EventStoreError::Internal(format!("empty ancestor chain for session {session_id}"))
        })
    }

    /// One event by ID.
    pub fn get_event(&self, event_id: &str) -> Result<Option<SessionEvent>> {
        let conn = self.conn()?;
        EventRepo::get_by_id(&conn, event_id)?
            .map(EventRow::into_event)
            .transpose()
    }

    /// Root-first chain ending at `event_id`, crossing fork points.
    pub fn get_ancestors(&self, event_id: &str) -> Result<Vec<SessionEvent>> {
        let conn = self.conn()?;
        rows_into_events(EventRepo::get_ancestors(&conn, event_id)?)
    }

    /// The session's own events of the given types.
    pub fn get_events_by_type(
        &self,
        session_id: &str,
        types: &[EventType],
        limit: Option<i64>,
    ) -> Result<Vec<SessionEvent>> {
        let conn = self.conn()?;
        rows_into_events(EventRepo::get_by_types(&conn, session_id, types, limit)?)
    }

    /// Listing row for one session.
    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let conn = self.conn()?;
        Ok(SessionRepo::get_by_id(&conn, session_id)?.map(SessionRow::into_summary))
    }

    /// Listing rows, most recently active first.
    pub fn list_sessions(&self, opts: &ListSessionsOptions) -> Result<Vec<SessionSummary>> {
        let conn = self.conn()?;
        Ok(SessionRepo::list(&conn, opts)?
            .into_iter()
            .map(SessionRow::into_summary)
            .collect())
    }

    /// All workspaces, most recently active first.
    pub fn list_workspaces(&self) -> Result<Vec<Workspace>> {
        let conn = self.conn()?;
        Ok(WorkspaceRepo::list(&conn)?.into_iter().map(Workspace::from).collect())
    }

    /// Full-text search over message and tool text.
    pub fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let conn = self.conn()?;
        SearchRepo::search(&conn, query, opts)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Transactions and locks
    // ─────────────────────────────────────────────────────────────────────

    fn read<T>(&self, op: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let value = op(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run `op` in an `IMMEDIATE` transaction, retrying sequence conflicts
    /// and busy/locked errors.
    fn write<T>(&self, mut op: impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let mut conflicts = 0u32;
        let mut busy = 0u32;
        loop {
            let err = match self.try_write(&mut op) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            match err {
                EventStoreError::SequenceConflict {
                    session_id,
                    sequence,
                    ..
                } => {
                    conflicts += 1;
                    if conflicts > self.conflict_retries {
                        warn!(%session_id, sequence, attempts = conflicts, "giving up on sequence conflict");
                        return Err(EventStoreError::SequenceConflict {
                            session_id,
                            sequence,
                            attempts: conflicts,
                        });
                    }
                    debug!(%session_id, sequence, attempt = conflicts, "sequence conflict, recomputing");
                }
                EventStoreError::Sqlite(ref e)
                    if is_sqlite_busy_or_locked(e) && busy < BUSY_RETRY_ATTEMPTS =>
                {
                    busy += 1;
                    let delay = calculate_linear_delay_with_random(
                        busy,
                        BUSY_STEP_MS,
                        BUSY_MAX_DELAY_MS,
                        BUSY_JITTER,
                        rand::random(),
                    );
                    debug!(attempt = busy, delay_ms = delay, "database busy, backing off");
                    std::thread::sleep(Duration::from_millis(delay));
                }
                other => return Err(other),
            }
        }
    }

    fn try_write<T>(&self, op: &mut impl FnMut(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let inner: &Connection = &tx;
        let value = op(inner)?;
        tx.commit()?;
        Ok(value)
    }

    fn lock_global(&self) -> Result<MutexGuard<'_, ()>> {
        self.global_lock.lock().map_err(|_| poisoned("global"))
    }
}

fn migrate(pool: &ConnectionPool) -> Result<()> {
    let conn = pool.get()?;
    let applied = run_migrations(&conn)?;
    if applied > 0 {
        debug!(applied, "applied schema migrations");
    }
    Ok(())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn poisoned(which: &str) -> EventStoreError {
    EventStoreError::Internal(format!("{which} write lock poisoned"))
}

/// The session row an append targets, creating it for a `session.start`.
fn resolve_session(
    conn: &Connection,
    session_id: &str,
    event_type: EventType,
    payload: &Value,
) -> Result<SessionRow> {
    match SessionRepo::get_by_id(conn, session_id)? {
        Some(_) if event_type == EventType::SessionStart => Err(EventStoreError::InvalidOperation(
            format!("session {session_id} has already started"),
        )),
        Some(row) => Ok(row),
        None if event_type == EventType::SessionStart => {
            let start: SessionStartPayload = serde_json::from_value(payload.clone())?;
            let ws = WorkspaceRepo::get_or_create(conn, &start.working_directory, None)?;
            SessionRepo::create(
                conn,
                &CreateSessionOptions {
                    id: session_id,
                    workspace_id: &ws.id,
                    model: &start.model,
                    working_directory: &start.working_directory,
                    title: start.title.as_deref(),
                    tags: start.tags.as_deref().unwrap_or(&[]),
                    parent_session_id: None,
                    fork_from_event_id: None,
                    created_at: &now(),
                },
            )?;
            SessionRepo::get_by_id(conn, session_id)?
                .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))
        }
        None => Err(EventStoreError::SessionNotFound(session_id.to_string())),
    }
}

/// The event at `sequence` (default: latest), range-checked.
fn resolve_at(conn: &Connection, session_id: &str, sequence: Option<i64>) -> Result<EventRow> {
    let latest = EventRepo::latest_sequence(conn, session_id)?
        .ok_or_else(|| EventStoreError::SessionNotFound(session_id.to_string()))?;
    let requested = sequence.unwrap_or(latest);
    if !(0..=latest).contains(&requested) {
        return Err(EventStoreError::OutOfRange {
            session_id: session_id.to_string(),
            requested,
            latest,
        });
    }
    EventRepo::get_at_sequence(conn, session_id, requested)?
        .ok_or_else(|| EventStoreError::EventNotFound(format!("{session_id}@{requested}")))
}

/// Insert the next event of `session` and update the listing row.
///
/// Must run inside the write transaction. A lost `(session_id, sequence)`
/// race comes back as `SequenceConflict` so [`EventStore::write`] retries.
fn insert_next(
    conn: &Connection,
    session: &SessionRow,
    event_type: EventType,
    payload: Value,
    parent_override: Option<String>,
) -> Result<SessionEvent> {
    let head = EventRepo::get_latest(conn, &session.id)?;
    let sequence = head.as_ref().map_or(0, |h| h.sequence + 1);
    let parent_id = parent_override.or_else(|| head.map(|h| h.id));
    insert_at(conn, session, sequence, parent_id, event_type, payload)
}

/// Insert an event at an explicit `sequence`, mapping a taken slot to
/// `SequenceConflict`.
fn insert_at(
    conn: &Connection,
    session: &SessionRow,
    sequence: i64,
    parent_id: Option<String>,
    event_type: EventType,
    payload: Value,
) -> Result<SessionEvent> {
    let mut event = SessionEvent {
        id: EventId::new().into_inner(),
        parent_id,
        session_id: session.id.clone(),
        workspace_id: session.workspace_id.clone(),
        timestamp: now(),
        event_type,
        sequence,
        checksum: None,
        payload,
    };
    event.checksum = Some(event.compute_checksum());

    if let Err(err) = EventRepo::insert(conn, &event) {
        return Err(if is_unique_violation(&err) {
            EventStoreError::SequenceConflict {
                session_id: session.id.clone(),
                sequence,
                attempts: 1,
            }
        } else {
            err
        });
    }

    let _ = SessionRepo::record_append(
        conn,
        &session.id,
        &event.id,
        &event.timestamp,
        &counter_delta(&event),
    )?;
    let _ = WorkspaceRepo::touch(conn, &session.workspace_id, &event.timestamp)?;
    update_listing(conn, &event)?;
    Ok(event)
}

fn counter_delta(event: &SessionEvent) -> CounterDelta {
    let usage = TokenUsage::from_payload(&event.payload).unwrap_or_default();
    let turn = if event.event_type == EventType::MessageAssistant {
        event.payload.get("turn").and_then(Value::as_i64)
    } else {
        None
    };
    CounterDelta {
        events: 1,
        messages: i64::from(event.event_type.is_message_type()),
        turn,
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
        cache_read_tokens: usage.cache_read_tokens.unwrap_or(0),
        cache_creation_tokens: usage.cache_creation_tokens.unwrap_or(0),
    }
}

/// Keep the listing columns that mirror projection state in step.
fn update_listing(conn: &Connection, event: &SessionEvent) -> Result<()> {
    match event.event_type {
        EventType::ConfigModelSwitch => {
            if let Some(model) = event.payload_str("newModel") {
                let _ = SessionRepo::update_latest_model(conn, &event.session_id, model)?;
            }
        }
        EventType::MetadataUpdate if event.payload_str("key") == Some("title") => {
            let title = event.payload.get("newValue").and_then(Value::as_str);
            let _ = SessionRepo::update_title(conn, &event.session_id, title)?;
        }
        EventType::SessionEnd => {
            let _ = SessionRepo::mark_ended(conn, &event.session_id, &event.timestamp)?;
        }
        _ => {}
    }
    Ok(())
}

/// Whether `err` is a `UNIQUE` constraint failure.
pub fn is_unique_violation(err: &EventStoreError) -> bool {
    matches!(
        err,
        EventStoreError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Whether `err` is `SQLITE_BUSY` or `SQLITE_LOCKED`.
pub fn is_sqlite_busy_or_locked(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-session locks
// ─────────────────────────────────────────────────────────────────────────────

/// Session id → lock. Entries are weak so idle sessions cost nothing once
/// pruned.
#[derive(Default)]
struct SessionLocks {
    inner: Mutex<HashMap<String, Weak<Mutex<()>>>>,
}

impl SessionLocks {
    fn get(&self, session_id: &str) -> Result<Arc<Mutex<()>>> {
        let mut map = self.inner.lock().map_err(|_| poisoned("session map"))?;
        if let Some(lock) = map.get(session_id).and_then(Weak::upgrade) {
            return Ok(lock);
        }
        if map.len() >= LOCK_PRUNE_THRESHOLD {
            map.retain(|_, lock| lock.strong_count() > 0);
        }
        let lock = Arc::new(Mutex::new(()));
        let _ = map.insert(session_id.to_string(), Arc::downgrade(&lock));
        Ok(lock)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
