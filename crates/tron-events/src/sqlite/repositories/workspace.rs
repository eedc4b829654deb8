//! Workspace repository: the `workspaces` table.
//!
//! A workspace is a project directory. Paths are unique, so every session
//! started in the same directory shares one workspace row.

use rusqlite::{params, Connection, OptionalExtension};
use tron_core::WorkspaceId;

use crate::errors::Result;
use crate::sqlite::row_types::WorkspaceRow;

const SELECT: &str = "SELECT w.id, w.path, w.name, w.created_at, w.last_activity_at,
        (SELECT COUNT(*) FROM sessions s WHERE s.workspace_id = w.id)
     FROM workspaces w";

/// Workspace repository. Stateless; every method takes `&Connection`.
pub struct WorkspaceRepo;

impl WorkspaceRepo {
    /// Insert a workspace for `path`.
    pub fn create(conn: &Connection, path: &str, name: Option<&str>) -> Result<WorkspaceRow> {
        let id = WorkspaceId::new().into_inner();
        let now = chrono::Utc::now().to_rfc3339();
        let _ = conn.execute(
            "INSERT INTO workspaces (id, path, name, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, path, name, now],
        )?;
        Ok(WorkspaceRow {
            id,
            path: path.to_string(),
            name: name.map(String::from),
            created_at: now.clone(),
            last_activity_at: now,
            session_count: Some(0),
        })
    }

    /// Look up by ID.
    pub fn get_by_id(conn: &Connection, workspace_id: &str) -> Result<Option<WorkspaceRow>> {
        let sql = format!("{SELECT} WHERE w.id = ?1");
        Ok(conn
            .query_row(&sql, params![workspace_id], Self::map_row)
            .optional()?)
    }

    /// Look up by filesystem path.
    pub fn get_by_path(conn: &Connection, path: &str) -> Result<Option<WorkspaceRow>> {
        let sql = format!("{SELECT} WHERE w.path = ?1");
        Ok(conn.query_row(&sql, params![path], Self::map_row).optional()?)
    }

    /// Existing workspace for `path`, or a new one.
    pub fn get_or_create(conn: &Connection, path: &str, name: Option<&str>) -> Result<WorkspaceRow> {
        match Self::get_by_path(conn, path)? {
            Some(ws) => Ok(ws),
            None => Self::create(conn, path, name),
        }
    }

    /// All workspaces, most recently active first.
    pub fn list(conn: &Connection) -> Result<Vec<WorkspaceRow>> {
        let sql = format!("{SELECT} ORDER BY w.last_activity_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Set `last_activity_at`.
    pub fn touch(conn: &Connection, workspace_id: &str, at: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE workspaces SET last_activity_at = ?1 WHERE id = ?2",
            params![at, workspace_id],
        )?;
        Ok(changed > 0)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkspaceRow> {
        Ok(WorkspaceRow {
            id: row.get(0)?,
            path: row.get(1)?,
            name: row.get(2)?,
            created_at: row.get(3)?,
            last_activity_at: row.get(4)?,
            session_count: row.get(5)?,
        })
    }
}

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn create_and_fetch() {
        let conn = setup();
        let ws = WorkspaceRepo::create(&conn, "/tmp/project", Some("Project")).unwrap();
        assert!(ws.id.starts_with("ws_"));

        let by_id = WorkspaceRepo::get_by_id(&conn, &ws.id).unwrap().unwrap();
        assert_eq!(by_id.path, "/tmp/project");
        assert_eq!(by_id.name.as_deref(), Some("Project"));
        assert_eq!(by_id.session_count, Some(0));

        let by_path = WorkspaceRepo::get_by_path(&conn, "/tmp/project").unwrap().unwrap();
        assert_eq!(by_path.id, ws.id);
    }

    #[test]
    fn duplicate_path_is_rejected() {
        let conn = setup();
        WorkspaceRepo::create(&conn, "/tmp/p", None).unwrap();
        assert!(WorkspaceRepo::create(&conn, "/tmp/p", None).is_err());
    }

    #[test]
    fn get_or_create_reuses_path() {
        let conn = setup();
        let a = WorkspaceRepo::get_or_create(&conn, "/tmp/p", None).unwrap();
        let b = WorkspaceRepo::get_or_create(&conn, "/tmp/p", Some("other")).unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(WorkspaceRepo::list(&conn).unwrap().len(), 1);
    }

    #[test]
    fn missing_lookups_are_none() {
        let conn = setup();
        assert!(WorkspaceRepo::get_by_id(&conn, "ws_missing").unwrap().is_none());
        assert!(WorkspaceRepo::get_by_path(&conn, "/nope").unwrap().is_none());
    }

    #[test]
    fn list_orders_by_activity() {
        let conn = setup();
        let a = WorkspaceRepo::create(&conn, "/tmp/a", None).unwrap();
        let b = WorkspaceRepo::create(&conn, "/tmp/b", None).unwrap();
        WorkspaceRepo::touch(&conn, &a.id, "2999-01-01T00:00:00Z").unwrap();
        let list = WorkspaceRepo::list(&conn).unwrap();
        assert_eq!(list[0].id, a.id);
        assert_eq!(list[1].id, b.id);
    }
}
