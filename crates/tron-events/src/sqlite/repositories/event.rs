//! Event repository: the append-only `events` table.
//!
//! Events are immutable once inserted. `parent_id` links form a chain that
//! can cross session boundaries at a fork; [`EventRepo::get_ancestors`] walks
//! it with a recursive CTE.

use std::fmt::Write;

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::errors::Result;
use crate::sqlite::repositories::search::SearchRepo;
use crate::sqlite::row_types::EventRow;
use crate::types::{EventType, SessionEvent};

const COLUMNS: &str = "id, session_id, parent_id, sequence, type, timestamp, payload,
    workspace_id, role, tool_name, tool_call_id, turn,
    input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens, checksum";

/// Inclusive sequence range for reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventRange {
    /// First sequence (inclusive).
    pub from: Option<i64>,
    /// Last sequence (inclusive).
    pub to: Option<i64>,
    /// Maximum events.
    pub limit: Option<i64>,
}

impl EventRange {
    /// Everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// `0..=to`.
    pub fn up_to(to: i64) -> Self {
        Self {
            to: Some(to),
            ..Self::default()
        }
    }
}

/// Event repository. Stateless; every method takes `&Connection`.
pub struct EventRepo;

impl EventRepo {
    /// Insert one event with its denormalized columns and full-text row.
    ///
    /// A `(session_id, sequence)` collision surfaces as a constraint error
    /// from the unique index.
    pub fn insert(conn: &Connection, event: &SessionEvent) -> Result<()> {
        let payload = serde_json::to_string(&event.payload)?;
        let usage = event.payload.get("tokenUsage");
        let usage_field = |k: &str| usage.and_then(|u| u.get(k)).and_then(Value::as_i64);

        let _ = conn.execute(
            "INSERT INTO events (id, session_id, parent_id, sequence, type, timestamp, payload,
             workspace_id, role, tool_name, tool_call_id, turn,
             input_tokens, output_tokens, cache_read_tokens, cache_creation_tokens, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                event.id,
                event.session_id,
                event.parent_id,
                event.sequence,
                event.event_type.as_str(),
                event.timestamp,
                payload,
                event.workspace_id,
                role_of(event.event_type),
                event.payload_str("name").or_else(|| event.payload_str("toolName")),
                event.payload_str("toolCallId"),
                event.payload.get("turn").and_then(Value::as_i64),
                usage_field("inputTokens"),
                usage_field("outputTokens"),
                usage_field("cacheReadTokens"),
                usage_field("cacheCreationTokens"),
                event.checksum,
            ],
        )?;

        if let Some(text) = searchable_text(event) {
            SearchRepo::index(conn, event, &text)?;
        }
        Ok(())
    }

    /// Fetch by ID.
    pub fn get_by_id(conn: &Connection, event_id: &str) -> Result<Option<EventRow>> {
        let sql = format!("SELECT {COLUMNS} FROM events WHERE id = ?1");
        Ok(conn.query_row(&sql, params![event_id], Self::map_row).optional()?)
    }

    /// Fetch the event at `sequence` in a session.
    pub fn get_at_sequence(conn: &Connection, session_id: &str, sequence: i64) -> Result<Option<EventRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM events WHERE session_id = ?1 AND sequence = ?2
             ORDER BY timestamp ASC LIMIT 1"
        );
        Ok(conn
            .query_row(&sql, params![session_id, sequence], Self::map_row)
            .optional()?)
    }

    /// Events of one session within `range`.
    ///
    /// Ordered by sequence; timestamp only breaks ties in legacy data.
    pub fn get_range(conn: &Connection, session_id: &str, range: &EventRange) -> Result<Vec<EventRow>> {
        let mut sql = format!(
            "SELECT {COLUMNS} FROM events
             WHERE session_id = ?1 AND sequence >= ?2 AND sequence <= ?3
             ORDER BY sequence ASC, timestamp ASC"
        );
        if let Some(limit) = range.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(
                params![session_id, range.from.unwrap_or(0), range.to.unwrap_or(i64::MAX)],
                Self::map_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Highest committed sequence, `None` for an empty log.
    pub fn latest_sequence(conn: &Connection, session_id: &str) -> Result<Option<i64>> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(sequence) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Sequence the next append should take: `MAX + 1`, or 0.
    pub fn next_sequence(conn: &Connection, session_id: &str) -> Result<i64> {
        Ok(Self::latest_sequence(conn, session_id)?.map_or(0, |s| s + 1))
    }

    /// The session's newest event.
    pub fn get_latest(conn: &Connection, session_id: &str) -> Result<Option<EventRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM events WHERE session_id = ?1
             ORDER BY sequence DESC, timestamp DESC LIMIT 1"
        );
        Ok(conn.query_row(&sql, params![session_id], Self::map_row).optional()?)
    }

    /// Ancestor chain from the root to `event_id` (inclusive).
    pub fn get_ancestors(conn: &Connection, event_id: &str) -> Result<Vec<EventRow>> {
        let sql = format!(
            "WITH RECURSIVE chain(id, lvl) AS (
               SELECT id, 0 FROM events WHERE id = ?1
               UNION ALL
               SELECT e.parent_id, c.lvl + 1
               FROM chain c JOIN events e ON e.id = c.id
               WHERE e.parent_id IS NOT NULL AND c.lvl < 100000
             )
             SELECT {COLUMNS} FROM events JOIN chain USING (id) ORDER BY chain.lvl DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![event_id], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Events of the given types in one session, in sequence order.
    pub fn get_by_types(
        conn: &Connection,
        session_id: &str,
        types: &[EventType],
        limit: Option<i64>,
    ) -> Result<Vec<EventRow>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let wires: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        let placeholders: Vec<String> = (2..=wires.len() + 1).map(|i| format!("?{i}")).collect();
        let mut sql = format!(
            "SELECT {COLUMNS} FROM events WHERE session_id = ?1 AND type IN ({})
             ORDER BY sequence ASC",
            placeholders.join(", ")
        );
        if let Some(limit) = limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
        values.push(&session_id);
        values.extend(wires.iter().map(|w| w as &dyn rusqlite::types::ToSql));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values.as_slice(), Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of events in a session's own log.
    pub fn count_by_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Sequences that occur more than once in a session. Empty unless the
    /// unique index is missing.
    pub fn duplicate_sequences(conn: &Connection, session_id: &str) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT sequence FROM events WHERE session_id = ?1
             GROUP BY sequence HAVING COUNT(*) > 1 ORDER BY sequence",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<EventRow> {
        Ok(EventRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            parent_id: row.get(2)?,
            sequence: row.get(3)?,
            event_type: row.get(4)?,
            timestamp: row.get(5)?,
            payload: row.get(6)?,
            workspace_id: row.get(7)?,
            role: row.get(8)?,
            tool_name: row.get(9)?,
            tool_call_id: row.get(10)?,
            turn: row.get(11)?,
            input_tokens: row.get(12)?,
            output_tokens: row.get(13)?,
            cache_read_tokens: row.get(14)?,
            cache_creation_tokens: row.get(15)?,
            checksum: row.get(16)?,
        })
    }
}

// ─── Extraction helpers ──────────────────────────────────────────────────────

fn role_of(event_type: EventType) -> Option<&'static str> {
    match event_type {
        EventType::MessageUser => Some("user"),
        EventType::MessageAssistant => Some("assistant"),
        EventType::MessageSystem => Some("system"),
        EventType::ToolResult => Some("tool"),
        _ => None,
    }
}

/// Text worth indexing for full-text search.
fn searchable_text(event: &SessionEvent) -> Option<String> {
    let text = match event.event_type {
        EventType::MessageUser | EventType::MessageAssistant | EventType::MessageSystem => {
            content_text(event.payload.get("content")?)
        }
        EventType::ToolResult => event.payload_str("content")?.to_string(),
        EventType::CompactSummary => event.payload_str("summary")?.to_string(),
        _ => return None,
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Plain text of a string or an array of `text` blocks.
fn content_text(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
