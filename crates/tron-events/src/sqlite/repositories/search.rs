//! Search repository: FTS5 full-text search over message and tool text.
//!
//! Rows are written by [`crate::sqlite::repositories::event::EventRepo::insert`]
//! and removed by the `events_fts_delete` trigger.

use std::fmt::Write;

use rusqlite::{params, Connection};

use crate::errors::Result;
use crate::types::state::SearchResult;
use crate::types::SessionEvent;

/// Search filters.
#[derive(Clone, Debug, Default)]
pub struct SearchOptions {
    /// Only hits from this session.
    pub session_id: Option<String>,
    /// Maximum hits (default 20).
    pub limit: Option<i64>,
}

/// Search repository. Stateless; every method takes `&Connection`.
pub struct SearchRepo;

impl SearchRepo {
    /// Add `text` to the index for `event`.
    pub fn index(conn: &Connection, event: &SessionEvent, text: &str) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO events_fts (event_id, session_id, type, content) VALUES (?1, ?2, ?3, ?4)",
            params![event.id, event.session_id, event.event_type.as_str(), text],
        )?;
        Ok(())
    }

    /// Ranked search. `query` is FTS5 syntax (`foo bar`, `"exact phrase"`,
    /// `foo OR bar`).
    pub fn search(conn: &Connection, query: &str, opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        let mut sql = String::from(
            "SELECT event_id, session_id, type,
                    snippet(events_fts, 3, '[', ']', '...', 16),
                    bm25(events_fts) AS score
             FROM events_fts WHERE events_fts MATCH ?1",
        );
        let mut values: Vec<&dyn rusqlite::types::ToSql> = Vec::new();
        values.push(&query);
        if let Some(session_id) = &opts.session_id {
            values.push(session_id);
            let _ = write!(sql, " AND session_id = ?{}", values.len());
        }
        let _ = write!(sql, " ORDER BY score LIMIT {}", opts.limit.unwrap_or(20));

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(values.as_slice(), |row| {
                Ok(SearchResult {
                    event_id: row.get(0)?,
                    session_id: row.get(1)?,
                    event_type: row.get(2)?,
                    snippet: row.get(3)?,
                    rank: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
