//! Projection and listing types.
//!
//! [`Session`] is the reconstructed view of a session. It is never stored;
//! [`crate::reconstruct::reconstruct_session`] rebuilds it from events every
//! time. The listing types mirror rows of the `sessions` and `workspaces`
//! tables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payloads::TokenUsage;

/// A reconstructed message from the event history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// `user`, `assistant` or `toolResult`.
    pub role: String,
    /// String for plain user text, an array of content blocks otherwise.
    pub content: Value,
    /// Tool call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Whether this tool result is an error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// A message with the events it was built from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWithEventId {
    /// The reconstructed message.
    pub message: Message,
    /// Source event IDs. Several when consecutive messages were merged,
    /// `None` for synthetic messages.
    pub event_ids: Vec<Option<String>>,
}

/// Session-level annotations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Tags, in the order they were added.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Session this one was forked from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    /// Sequence in the parent the fork was cut at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_from_index: Option<i64>,
}

/// Last known working-directory state, from `worktree.*` events.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeState {
    /// Absolute path of the working directory.
    pub path: String,
    /// Branch name, `none` outside git.
    pub branch: String,
    /// Commit the directory was created from.
    pub base_commit: String,
    /// Whether this is a private worktree.
    pub isolated: bool,
    /// Most recent commit recorded for the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    /// Set once `worktree.released` is seen.
    pub released: bool,
}

/// Reconstructed session state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session ID.
    pub id: String,
    /// Working directory recorded at start.
    pub working_directory: String,
    /// Current model.
    pub model: String,
    /// Current provider, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Current system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Conversation messages in sequence order.
    pub messages: Vec<MessageWithEventId>,
    /// Timestamp of the session's first own event.
    pub created_at: String,
    /// Timestamp of the newest event in the chain.
    pub last_activity_at: String,
    /// Set by the session's own `session.end`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// `false` once ended.
    pub is_active: bool,
    /// Cumulative usage over the whole chain.
    pub token_usage: TokenUsage,
    /// Title, tags and fork origin.
    pub metadata: SessionMetadata,
    /// Highest assistant turn seen.
    pub turn_count: i64,
    /// Reasoning level, if configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_level: Option<String>,
    /// Active skills, in activation order.
    #[serde(default)]
    pub active_skills: Vec<String>,
    /// Working directory state, if one was acquired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<WorktreeState>,
    /// Sequence of the event the projection was built up to.
    pub head_sequence: i64,
    /// ID of that event.
    pub head_event_id: String,
}

impl Session {
    /// Plain messages without event provenance.
    pub fn plain_messages(&self) -> Vec<Message> {
        self.messages.iter().map(|m| m.message.clone()).collect()
    }
}

/// One row of the session listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Session ID.
    pub id: String,
    /// Workspace ID.
    pub workspace_id: String,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Model as of the latest append.
    pub latest_model: String,
    /// Working directory.
    pub working_directory: String,
    /// Newest event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_event_id: Option<String>,
    /// First event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_event_id: Option<String>,
    /// Source session for forks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<String>,
    /// Source event for forks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fork_from_event_id: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last append timestamp.
    pub last_activity_at: String,
    /// End timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    /// Events in this session's own log.
    pub event_count: i64,
    /// User and assistant messages in this session's own log.
    pub message_count: i64,
    /// Highest turn appended.
    pub turn_count: i64,
    /// Token usage over this session's own log.
    pub token_usage: TokenUsage,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SessionSummary {
    /// Whether the session has not ended.
    pub fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// Workspace info.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    /// Workspace ID.
    pub id: String,
    /// Absolute path.
    pub path: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creation timestamp.
    pub created_at: String,
    /// Last activity timestamp.
    pub last_activity_at: String,
    /// Number of sessions.
    pub session_count: i64,
}

/// Search hit from the full-text index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Matching event.
    pub event_id: String,
    /// Session the event belongs to.
    pub session_id: String,
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Highlighted excerpt.
    pub snippet: String,
    /// BM25 rank; lower is better.
    pub rank: f64,
}
