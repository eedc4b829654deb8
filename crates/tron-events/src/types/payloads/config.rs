//! Configuration change payloads.

use serde::{Deserialize, Serialize};

/// Payload for `config.model_switch` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigModelSwitchPayload {
    /// Model before the switch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_model: Option<String>,
    /// Model after the switch.
    pub new_model: String,
    /// Provider after the switch, when it changed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// Payload for `config.prompt_update` events.
///
/// When `content` is present it replaces the system prompt; otherwise only
/// the hash is recorded and the prompt reads as a hash placeholder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigPromptUpdatePayload {
    /// Hash of the new prompt.
    pub new_hash: String,
    /// Hash of the previous prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// New prompt text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Payload for `config.reasoning_level` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigReasoningLevelPayload {
    /// New level, or `None` to reset to the model default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_level: Option<String>,
    /// Previous level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_level: Option<String>,
}
