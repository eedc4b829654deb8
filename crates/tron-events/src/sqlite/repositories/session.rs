//! Session repository: the `sessions` listing index.
//!
//! A row holds head/root pointers and denormalized counters over the
//! session's own events. Reconstruction never reads it beyond checking
//! existence.

use std::fmt::Write;

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;
use crate::sqlite::row_types::SessionRow;

const COLUMNS: &str = "id, workspace_id, head_event_id, root_event_id, title, latest_model,
    working_directory, parent_session_id, fork_from_event_id, created_at, last_activity_at,
    ended_at, event_count, message_count, turn_count, total_input_tokens, total_output_tokens,
    total_cache_read_tokens, total_cache_creation_tokens, tags";

/// Options for inserting a session row.
pub struct CreateSessionOptions<'a> {
    /// Session ID, allocated by the caller.
    pub id: &'a str,
    /// Owning workspace.
    pub workspace_id: &'a str,
    /// Model at creation.
    pub model: &'a str,
    /// Working directory.
    pub working_directory: &'a str,
    /// Title.
    pub title: Option<&'a str>,
    /// Tags.
    pub tags: &'a [String],
    /// Source session for forks.
    pub parent_session_id: Option<&'a str>,
    /// Source event for forks.
    pub fork_from_event_id: Option<&'a str>,
    /// Creation timestamp.
    pub created_at: &'a str,
}

/// Filters for listing sessions.
#[derive(Clone, Debug, Default)]
pub struct ListSessionsOptions {
    /// Only sessions in this workspace.
    pub workspace_id: Option<String>,
    /// `Some(true)` for ended sessions only, `Some(false)` for active only.
    pub ended: Option<bool>,
    /// Only forks of this session.
    pub parent_session_id: Option<String>,
    /// Maximum rows.
    pub limit: Option<i64>,
    /// Rows to skip.
    pub offset: Option<i64>,
}

/// Counter deltas applied on append.
#[derive(Clone, Debug, Default)]
pub struct CounterDelta {
    /// Events added.
    pub events: i64,
    /// Message events added.
    pub messages: i64,
    /// Turn seen on the event; the row keeps the maximum.
    pub turn: Option<i64>,
    /// Input tokens added.
    pub input_tokens: i64,
    /// Output tokens added.
    pub output_tokens: i64,
    /// Cache read tokens added.
    pub cache_read_tokens: i64,
    /// Cache creation tokens added.
    pub cache_creation_tokens: i64,
}

/// Session repository. Stateless; every method takes `&Connection`.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a session row with zeroed counters.
    pub fn create(conn: &Connection, opts: &CreateSessionOptions<'_>) -> Result<()> {
        let tags = serde_json::to_string(opts.tags)?;
        let _ = conn.execute(
            "INSERT INTO sessions (id, workspace_id, title, latest_model, working_directory,
             parent_session_id, fork_from_event_id, created_at, last_activity_at, tags)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?9)",
            params![
                opts.id,
                opts.workspace_id,
                opts.title,
                opts.model,
                opts.working_directory,
                opts.parent_session_id,
                opts.fork_from_event_id,
                opts.created_at,
                tags,
            ],
        )?;
        Ok(())
    }

    /// Fetch one row.
    pub fn get_by_id(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>> {
        let sql = format!("SELECT {COLUMNS} FROM sessions WHERE id = ?1");
        Ok(conn
            .query_row(&sql, params![session_id], Self::map_row)
            .optional()?)
    }

    /// Whether a row exists.
    pub fn exists(conn: &Connection, session_id: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1)",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// List rows, most recently active first.
    pub fn list(conn: &Connection, opts: &ListSessionsOptions) -> Result<Vec<SessionRow>> {
        let mut sql = format!("SELECT {COLUMNS} FROM sessions WHERE 1=1");
        let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();

        if let Some(ws) = &opts.workspace_id {
            values.push(ws);
            let _ = write!(sql, " AND workspace_id = ?{}", values.len());
        }
        if let Some(parent) = &opts.parent_session_id {
            values.push(parent);
            let _ = write!(sql, " AND parent_session_id = ?{}", values.len());
        }
        match opts.ended {
            Some(true) => sql.push_str(" AND ended_at IS NOT NULL"),
            Some(false) => sql.push_str(" AND ended_at IS NULL"),
            None => {}
        }
        sql.push_str(" ORDER BY last_activity_at DESC, id ASC");
        if let Some(limit) = opts.limit {
            let _ = write!(sql, " LIMIT {limit}");
            if let Some(offset) = opts.offset {
                let _ = write!(sql, " OFFSET {offset}");
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values.as_slice(), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Move the head pointer and bump counters after an append.
    pub fn record_append(
        conn: &Connection,
        session_id: &str,
        head_event_id: &str,
        at: &str,
        delta: &CounterDelta,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET
                head_event_id = ?2,
                root_event_id = COALESCE(root_event_id, ?2),
                last_activity_at = ?3,
                event_count = event_count + ?4,
                message_count = message_count + ?5,
                turn_count = MAX(turn_count, COALESCE(?6, turn_count)),
                total_input_tokens = total_input_tokens + ?7,
                total_output_tokens = total_output_tokens + ?8,
                total_cache_read_tokens = total_cache_read_tokens + ?9,
                total_cache_creation_tokens = total_cache_creation_tokens + ?10
             WHERE id = ?1",
            params![
                session_id,
                head_event_id,
                at,
                delta.events,
                delta.messages,
                delta.turn,
                delta.input_tokens,
                delta.output_tokens,
                delta.cache_read_tokens,
                delta.cache_creation_tokens,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Set `ended_at`.
    pub fn mark_ended(conn: &Connection, session_id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = ?2 WHERE id = ?1",
            params![session_id, at],
        )?;
        Ok(changed > 0)
    }

    /// Clear `ended_at`, e.g. after rewinding past a `session.end`.
    pub fn clear_ended(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET ended_at = NULL WHERE id = ?1",
            params![session_id],
        )?;
        Ok(changed > 0)
    }

    /// Record a model switch.
    pub fn update_latest_model(conn: &Connection, session_id: &str, model: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET latest_model = ?2 WHERE id = ?1",
            params![session_id, model],
        )?;
        Ok(changed > 0)
    }

    /// Record a title change.
    pub fn update_title(conn: &Connection, session_id: &str, title: Option<&str>) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE sessions SET title = ?2 WHERE id = ?1",
            params![session_id, title],
        )?;
        Ok(changed > 0)
    }

    /// Number of sessions forked from `session_id`.
    pub fn count_forks(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions WHERE parent_session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Delete the row; events cascade.
    pub fn delete(conn: &Connection, session_id: &str) -> Result<bool> {
        let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
        Ok(SessionRow {
            id: row.get(0)?,
            workspace_id: row.get(1)?,
            head_event_id: row.get(2)?,
            root_event_id: row.get(3)?,
            title: row.get(4)?,
            latest_model: row.get(5)?,
            working_directory: row.get(6)?,
            parent_session_id: row.get(7)?,
            fork_from_event_id: row.get(8)?,
            created_at: row.get(9)?,
            last_activity_at: row.get(10)?,
            ended_at: row.get(11)?,
            event_count: row.get(12)?,
            message_count: row.get(13)?,
            turn_count: row.get(14)?,
            total_input_tokens: row.get(15)?,
            total_output_tokens: row.get(16)?,
            total_cache_read_tokens: row.get(17)?,
            total_cache_creation_tokens: row.get(18)?,
            tags: row.get(19)?,
        })
    }
}
