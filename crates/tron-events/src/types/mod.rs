//! Event type definitions.
//!
//! - [`EventType`]: closed enum of event discriminators, with an
//!   `Unrecognized` catch-all for types written by newer builds.
//! - [`SessionEvent`]: base fields plus an opaque `payload`.
//! - [`SessionEventPayload`]: typed payload access via [`SessionEvent::typed_payload()`].
//! - [`payloads`]: payload structs per domain.
//! - [`state`]: the reconstructed [`Session`] and listing types.

#[macro_use]
mod macros;

pub mod base;
pub mod event_type;
pub mod payloads;
pub mod state;

pub use base::SessionEvent;
pub use event_type::{ALL_EVENT_TYPES, EventType, SessionEventPayload};
pub use payloads::TokenUsage;
pub use state::{
    Message, MessageWithEventId, SearchResult, Session, SessionMetadata, SessionSummary,
    Workspace, WorktreeState,
};
