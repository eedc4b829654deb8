//! Runtime error types.

use tron_events::EventStoreError;
use tron_worktree::WorktreeError;

/// Errors surfaced by the session manager.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Event store failure.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Worktree setup or git failure.
    #[error("Worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl RuntimeError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EventStore(e) => e.is_retryable(),
            Self::Worktree(e) => e.is_transient(),
            Self::SessionNotFound(_) => false,
        }
    }

    /// Error category string for logs and callers.
    pub fn category(&self) -> &str {
        match self {
            Self::EventStore(_) => "event_store",
            Self::Worktree(_) => "worktree",
            Self::SessionNotFound(_) => "session_not_found",
        }
    }

    /// Lift store errors, keeping "not found" as its own variant.
    pub(crate) fn from_store(err: EventStoreError) -> Self {
        match err {
            EventStoreError::SessionNotFound(id) => Self::SessionNotFound(id),
            other => Self::EventStore(other),
        }
    }
}

/// Result alias for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wraps_sources() {
        let err = RuntimeError::from(EventStoreError::SessionNotFound("s1".into()));
        assert!(err.to_string().starts_with("Event store error:"));
        assert_eq!(err.category(), "event_store");

        let err = RuntimeError::from(WorktreeError::SessionNotActive("s1".into()));
        assert_eq!(
            err.to_string(),
            "Worktree error: session has no active working directory: s1"
        );
        assert_eq!(err.category(), "worktree");

        let err = RuntimeError::SessionNotFound("s9".into());
        assert_eq!(err.to_string(), "Session not found: s9");
        assert!(!err.is_retryable());
    }

    #[test]
    fn from_store_maps_not_found() {
        let err = RuntimeError::from_store(EventStoreError::SessionNotFound("x".into()));
        assert!(matches!(err, RuntimeError::SessionNotFound(id) if id == "x"));

        let err = RuntimeError::from_store(EventStoreError::Internal("boom".into()));
        assert!(matches!(err, RuntimeError::EventStore(_)));
    }

    #[test]
    fn retryable_follows_source() {
        let timeout = WorktreeError::Timeout {
            command: "status".into(),
            timeout_ms: 10,
        };
        assert!(RuntimeError::from(timeout).is_retryable());
    }
}
