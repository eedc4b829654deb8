//! The [`SessionEvent`] struct, the persisted unit of the log.
//!
//! Base fields sit at the top level and the variant data lives in an opaque
//! `payload`. Typed access is opt-in via [`SessionEvent::typed_payload()`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::event_type::EventType;

/// A persisted session event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Unique event ID.
    pub id: String,
    /// Event this one logically follows. `None` only for a fresh
    /// `session.start`; a fork's first event points into the source session.
    pub parent_id: Option<String>,
    /// Session this event belongs to.
    pub session_id: String,
    /// Workspace this event belongs to.
    pub workspace_id: String,
    /// RFC 3339 timestamp. Informational only; never used for ordering.
    pub timestamp: String,
    /// Event type discriminator.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Position within the session, contiguous from 0.
    pub sequence: i64,
    /// SHA-256 over the identity fields and payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Event-specific data.
    pub payload: Value,
}

impl SessionEvent {
    /// Compute the integrity checksum for this event's content.
    pub fn compute_checksum(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.id.as_str(),
            self.parent_id.as_deref().unwrap_or(""),
            self.session_id.as_str(),
            self.event_type.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.sequence.to_le_bytes());
        hasher.update(self.payload.to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Whether the stored checksum (if any) matches the content.
    pub fn verify_checksum(&self) -> bool {
        self.checksum
            .as_deref()
            .is_none_or(|c| c == self.compute_checksum())
    }

    /// Read a string field from the payload.
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}
