//! Context-invalidation payloads: compaction and explicit clears.
//!
//! Both mark a boundary. Message content before the most recent boundary is
//! left out of reconstruction; it stays in the log for audit and search.

use serde::{Deserialize, Serialize};

/// Payload for `compact.boundary` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactBoundaryPayload {
    /// First compacted event.
    pub from_event_id: String,
    /// Last compacted event.
    pub to_event_id: String,
    /// Token estimate before compaction.
    pub original_tokens: i64,
    /// Token estimate after compaction.
    pub compacted_tokens: i64,
}

/// Payload for `compact.summary` events, produced by an external summarizer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactSummaryPayload {
    /// Summary text injected in place of the compacted history.
    pub summary: String,
    /// Matching `compact.boundary` event.
    pub boundary_event_id: String,
    /// Files touched in the compacted range.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_modified: Option<Vec<String>>,
}

/// Payload for `context.cleared` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextClearedPayload {
    /// Why the context was cleared.
    pub reason: String,
    /// Token estimate before clearing.
    #[serde(default)]
    pub tokens_before: i64,
}
