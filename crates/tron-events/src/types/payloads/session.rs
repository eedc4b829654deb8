//! Session lifecycle payloads: start, end, fork, rewind.

use serde::{Deserialize, Serialize};

use super::token_usage::TokenUsage;

/// Payload for `session.start` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartPayload {
    /// Directory the session operates in.
    pub working_directory: String,
    /// Model the session starts with.
    pub model: String,
    /// Provider name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Initial system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Initial tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Payload for `session.end` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEndPayload {
    /// Why the session ended (`completed`, `aborted`, …).
    pub reason: String,
    /// Optional closing summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Usage over the whole session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_token_usage: Option<TokenUsage>,
}

/// Payload for `session.fork` events, the first event of a forked session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionForkPayload {
    /// Session the history was taken from.
    pub source_session_id: String,
    /// Last inherited event.
    pub source_event_id: String,
    /// Sequence of the last inherited event in the source session.
    pub source_sequence: i64,
    /// Title for the new session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Model override for the new session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload for `session.rewind` markers.
///
/// The marker's `parentId` points at the event at `toSequence`, so everything
/// appended between that event and the marker drops out of reconstruction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRewindPayload {
    /// Last sequence that stays visible (inclusive).
    pub to_sequence: i64,
    /// Event at `toSequence`.
    pub to_event_id: String,
    /// Latest sequence before the rewind.
    pub from_sequence: i64,
}
