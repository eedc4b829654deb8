//! Message payloads: user, assistant, system, and soft deletion.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::token_usage::TokenUsage;

/// Payload for `message.user` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessagePayload {
    /// A plain string or an array of content blocks.
    pub content: Value,
    /// Turn number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<i64>,
}

/// Payload for `message.assistant` events.
///
/// `content` is the ordered block array exactly as the model produced it:
/// text, thinking, and `tool_use` blocks stay in their original order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessagePayload {
    /// Ordered content blocks.
    pub content: Value,
    /// Turn number.
    pub turn: i64,
    /// Usage for this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Why the model stopped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    /// Model that produced the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload for `message.system` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessagePayload {
    /// Injected text.
    pub content: String,
    /// Where it came from (`hook`, `rules`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Payload for `message.deleted` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDeletedPayload {
    /// Event being hidden from reconstruction.
    pub target_event_id: String,
    /// Wire type of the target event.
    pub target_type: String,
    /// Why it was deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
