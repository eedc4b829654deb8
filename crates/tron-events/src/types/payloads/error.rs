//! Error payloads. Recorded for audit; reconstruction ignores them.

use serde::{Deserialize, Serialize};

/// Payload for `error.agent` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorAgentPayload {
    /// Error message.
    pub error: String,
    /// Error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Whether the session can continue.
    #[serde(default)]
    pub recoverable: bool,
}

/// Payload for `error.tool` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorToolPayload {
    /// Tool name.
    pub tool_name: String,
    /// Tool call ID.
    pub tool_call_id: String,
    /// Error message.
    pub error: String,
}

/// Payload for `error.provider` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorProviderPayload {
    /// Provider name.
    pub provider: String,
    /// Error message.
    pub error: String,
    /// Whether a retry may succeed.
    #[serde(default)]
    pub retryable: bool,
}
