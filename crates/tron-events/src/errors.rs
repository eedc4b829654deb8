//! Error types for the event store subsystem.
//!
//! [`EventStoreError`] is returned by every event store operation. None of
//! these are swallowed by the store itself: appends and reconstruction are
//! correctness-critical and always surface to the caller.

use thiserror::Error;

/// Errors that can occur during event store operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Requested event was not found.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// Another writer kept winning the `(session_id, sequence)` slot.
    ///
    /// Retrying the whole operation is safe.
    #[error("sequence conflict in session {session_id} at sequence {sequence} after {attempts} attempts")]
    SequenceConflict {
        /// Session being appended to.
        session_id: String,
        /// Last sequence that was attempted.
        sequence: i64,
        /// Insert attempts made.
        attempts: u32,
    },

    /// A sequence argument fell outside the session's log.
    #[error("sequence {requested} out of range for session {session_id} (latest is {latest})")]
    OutOfRange {
        /// Session the range refers to.
        session_id: String,
        /// Requested sequence.
        requested: i64,
        /// Latest committed sequence.
        latest: i64,
    },

    /// Invalid operation on the event store.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal error (e.g. poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

impl EventStoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SequenceConflict { .. } => true,
            Self::Sqlite(e) => crate::store::is_sqlite_busy_or_locked(e),
            _ => false,
        }
    }
}

/// Convenience type alias for event store results.
pub type Result<T> = std::result::Result<T, EventStoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
