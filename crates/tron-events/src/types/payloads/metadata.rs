//! Session annotation payloads: metadata, tags, skills.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for `metadata.update` events. Key `title` renames the session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataUpdatePayload {
    /// Metadata key.
    pub key: String,
    /// New value.
    pub new_value: Value,
}

/// Tag operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagAction {
    /// Add the tag.
    Add,
    /// Remove the tag.
    Remove,
}

/// Payload for `metadata.tag` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataTagPayload {
    /// Add or remove.
    pub action: TagAction,
    /// Tag value.
    pub tag: String,
}

/// Payload for `skill.added` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillAddedPayload {
    /// Skill name.
    pub skill_name: String,
    /// `global` or `project`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Payload for `skill.removed` events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRemovedPayload {
    /// Skill name.
    pub skill_name: String,
}
