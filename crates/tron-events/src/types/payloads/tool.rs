//! Tool payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `tool.call` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallPayload {
    /// Tool call ID, matching the assistant's `tool_use` block.
    pub tool_call_id: String,
    /// Tool name.
    pub name: String,
    /// Full (untruncated) arguments.
    pub arguments: Value,
    /// Turn number.
    pub turn: i64,
}

/// Payload for `tool.result` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultPayload {
    /// Tool call this answers.
    pub tool_call_id: String,
    /// Result text.
    pub content: String,
    /// Whether execution failed.
    #[serde(default)]
    pub is_error: bool,
    /// Wall time in milliseconds.
    #[serde(default)]
    pub duration: i64,
}
