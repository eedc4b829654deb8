//! Raw row structs for the `sessions`, `events` and `workspaces` tables.
//!
//! Conversion to the public types ([`SessionEvent`], [`SessionSummary`],
//! [`Workspace`]) lives here so repositories stay thin.

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::types::base::SessionEvent;
use crate::types::payloads::TokenUsage;
use crate::types::state::{SessionSummary, Workspace};
use crate::types::EventType;

/// Raw session row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRow {
    /// Session ID.
    pub id: String,
    /// Workspace ID.
    pub workspace_id: String,
    /// Newest event.
    pub head_event_id: Option<String>,
    /// First event.
    pub root_event_id: Option<String>,
    /// Title.
    pub title: Option<String>,
    /// Model as of the latest append.
    pub latest_model: String,
    /// Working directory.
    pub working_directory: String,
    /// Source session for forks.
    pub parent_session_id: Option<String>,
    /// Source event for forks.
    pub fork_from_event_id: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last append timestamp.
    pub last_activity_at: String,
    /// End timestamp.
    pub ended_at: Option<String>,
    /// Events in the session's own log.
    pub event_count: i64,
    /// Message events in the session's own log.
    pub message_count: i64,
    /// Highest turn appended.
    pub turn_count: i64,
    /// Total input tokens.
    pub total_input_tokens: i64,
    /// Total output tokens.
    pub total_output_tokens: i64,
    /// Total cache read tokens.
    pub total_cache_read_tokens: i64,
    /// Total cache creation tokens.
    pub total_cache_creation_tokens: i64,
    /// Tags as a JSON array string.
    pub tags: String,
}

impl SessionRow {
    /// Public listing view.
    pub fn into_summary(self) -> SessionSummary {
        let tags = serde_json::from_str(&self.tags).unwrap_or_default();
        let opt = |v: i64| (v != 0).then_some(v);
        SessionSummary {
            token_usage: TokenUsage {
                input_tokens: self.total_input_tokens,
                output_tokens: self.total_output_tokens,
                cache_read_tokens: opt(self.total_cache_read_tokens),
                cache_creation_tokens: opt(self.total_cache_creation_tokens),
            },
            id: self.id,
            workspace_id: self.workspace_id,
            title: self.title,
            latest_model: self.latest_model,
            working_directory: self.working_directory,
            head_event_id: self.head_event_id,
            root_event_id: self.root_event_id,
            parent_session_id: self.parent_session_id,
            fork_from_event_id: self.fork_from_event_id,
            created_at: self.created_at,
            last_activity_at: self.last_activity_at,
            ended_at: self.ended_at,
            event_count: self.event_count,
            message_count: self.message_count,
            turn_count: self.turn_count,
            tags,
        }
    }
}

/// Raw event row, including the denormalized query columns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventRow {
    /// Event ID.
    pub id: String,
    /// Session ID.
    pub session_id: String,
    /// Parent event ID.
    pub parent_id: Option<String>,
    /// Sequence number.
    pub sequence: i64,
    /// Event type string as stored.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Timestamp.
    pub timestamp: String,
    /// Payload JSON.
    pub payload: String,
    /// Workspace ID.
    pub workspace_id: String,
    /// Denormalized role.
    pub role: Option<String>,
    /// Denormalized tool name.
    pub tool_name: Option<String>,
    /// Denormalized tool call ID.
    pub tool_call_id: Option<String>,
    /// Denormalized turn number.
    pub turn: Option<i64>,
    /// Denormalized input tokens.
    pub input_tokens: Option<i64>,
    /// Denormalized output tokens.
    pub output_tokens: Option<i64>,
    /// Denormalized cache read tokens.
    pub cache_read_tokens: Option<i64>,
    /// Denormalized cache creation tokens.
    pub cache_creation_tokens: Option<i64>,
    /// Checksum written at insert.
    pub checksum: Option<String>,
}

impl EventRow {
    /// Parse into a [`SessionEvent`]. Unknown types become
    /// [`EventType::Unrecognized`].
    pub fn into_event(self) -> Result<SessionEvent> {
        Ok(SessionEvent {
            payload: serde_json::from_str(&self.payload)?,
            event_type: EventType::from_wire(&self.event_type),
            id: self.id,
            parent_id: self.parent_id,
            session_id: self.session_id,
            workspace_id: self.workspace_id,
            timestamp: self.timestamp,
            sequence: self.sequence,
            checksum: self.checksum,
        })
    }
}

/// Raw workspace row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkspaceRow {
    /// Workspace ID.
    pub id: String,
    /// Absolute path.
    pub path: String,
    /// Display name.
    pub name: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last activity timestamp.
    pub last_activity_at: String,
    /// Session count (computed via subquery).
    pub session_count: Option<i64>,
}

impl From<WorkspaceRow> for Workspace {
    fn from(row: WorkspaceRow) -> Self {
        Self {
            id: row.id,
            path: row.path,
            name: row.name,
            created_at: row.created_at,
            last_activity_at: row.last_activity_at,
            session_count: row.session_count.unwrap_or(0),
        }
    }
}

/// Convert a batch of rows, failing on the first malformed payload.
pub fn rows_into_events(rows: Vec<EventRow>) -> Result<Vec<SessionEvent>> {
    rows.into_iter().map(EventRow::into_event).collect()
}
