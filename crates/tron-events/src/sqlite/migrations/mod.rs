//! Schema migration runner for the event store database.
//!
//! Migrations are embedded at compile time via [`include_str!`] and applied in
//! version order, each inside its own transaction. The `schema_version` table
//! records what has been applied, so running the migrator twice is a no-op and
//! databases written by older builds upgrade in place.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::errors::{EventStoreError, Result};

/// A single migration with a version number and SQL to execute.
struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
    /// Runs inside the migration transaction before `sql`.
    precheck: Option<fn(&Connection) -> Result<()>>,
}

/// All migrations in version order.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Core schema: workspaces, sessions, events",
        sql: include_str!("v001_schema.sql"),
        precheck: None,
    },
    Migration {
        version: 2,
        description: "Unique per-session event sequence index",
        sql: include_str!("v002_session_sequence_unique.sql"),
        precheck: Some(reject_duplicate_sequences),
    },
    Migration {
        version: 3,
        description: "Full-text search over event content",
        sql: include_str!("v003_events_fts.sql"),
        precheck: None,
    },
];

/// Run all pending migrations on the given connection.
///
/// Returns the number of migrations applied.
///
/// # Errors
///
/// Returns [`EventStoreError::Migration`] if any migration fails; that
/// migration's transaction is rolled back and later ones are not attempted.
pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied, skipping");
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(conn, migration)?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, version = latest_version(), "migrations complete");
    }

    Ok(applied)
}

/// Return the highest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .map_err(|e| EventStoreError::Migration {
        message: format!("failed to read schema_version: {e}"),
    })
}

/// Return the latest migration version defined in code.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
           version     INTEGER PRIMARY KEY,
           applied_at  TEXT    NOT NULL,
           description TEXT
         );",
    )
    .map_err(|e| EventStoreError::Migration {
        message: format!("failed to create schema_version table: {e}"),
    })
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    let fail = |what: &str, e: &dyn std::fmt::Display| EventStoreError::Migration {
        message: format!(
            "v{} ({}) {what}: {e}",
            migration.version, migration.description
        ),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| fail("could not begin", &e))?;

    if let Some(check) = migration.precheck {
        check(&tx).map_err(|e| fail("precheck failed", &e))?;
    }

    tx.execute_batch(migration.sql)
        .map_err(|e| fail("failed", &e))?;

    let _ = tx
        .execute(
            "INSERT INTO schema_version (version, applied_at, description)
             VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?2)",
            params![migration.version, migration.description],
        )
        .map_err(|e| fail("could not be recorded", &e))?;

    tx.commit().map_err(|e| fail("could not commit", &e))
}

/// Refuse to build the unique index over a log that already violates it.
fn reject_duplicate_sequences(conn: &Connection) -> Result<()> {
    let duplicate: Option<(String, i64)> = conn
        .query_row(
            "SELECT session_id, sequence FROM events
             GROUP BY session_id, sequence HAVING COUNT(*) > 1 LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match duplicate {
        Some((session_id, sequence)) => Err(EventStoreError::Migration {
            message: format!("session {session_id} has duplicate sequence {sequence}"),
        }),
        None => Ok(()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
