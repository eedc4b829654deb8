//! Where worktree lifecycle events go.
//!
//! The coordinator reports every transition through a [`WorktreeEventSink`].
//! [`EventStoreSink`] appends them to the session's own log, so worktree
//! state replays with the rest of the conversation.

use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use tron_events::types::payloads::worktree::{
    WorktreeAcquiredPayload, WorktreeCommitPayload, WorktreeMergedPayload, WorktreeReleasedPayload,
};
use tron_events::{AppendOptions, EventStore, EventType};

/// A worktree lifecycle transition.
#[derive(Clone, Debug, PartialEq)]
pub enum WorktreeEvent {
    /// A working directory was handed to the session.
    Acquired(WorktreeAcquiredPayload),
    /// A commit was made on the session's behalf.
    Commit(WorktreeCommitPayload),
    /// The working directory was given back.
    Released(WorktreeReleasedPayload),
    /// The session branch was merged.
    Merged(WorktreeMergedPayload),
}

impl WorktreeEvent {
    /// Matching store event type.
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Acquired(_) => EventType::WorktreeAcquired,
            Self::Commit(_) => EventType::WorktreeCommit,
            Self::Released(_) => EventType::WorktreeReleased,
            Self::Merged(_) => EventType::WorktreeMerged,
        }
    }

    /// Wire payload.
    pub fn to_payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::Acquired(p) => serde_json::to_value(p),
            Self::Commit(p) => serde_json::to_value(p),
            Self::Released(p) => serde_json::to_value(p),
            Self::Merged(p) => serde_json::to_value(p),
        }
    }
}

/// Receives worktree events. Implementations must not fail the caller.
pub trait WorktreeEventSink: Send + Sync {
    /// Deliver `event` for `session_id`.
    fn emit(&self, session_id: &str, event: WorktreeEvent);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl WorktreeEventSink for NoopSink {
    fn emit(&self, _session_id: &str, _event: WorktreeEvent) {}
}

/// Appends each event to the session's log.
///
/// The append is a blocking `SQLite` write (it may sleep through busy
/// retries); on a multi-threaded runtime it runs under
/// [`tokio::task::block_in_place`] so other tasks move to another worker.
/// Append failures (unknown session, busy database past the retry bound) are
/// logged; the worktree transition has already happened.
#[derive(Clone)]
pub struct EventStoreSink {
    store: Arc<EventStore>,
}

impl EventStoreSink {
    /// Sink over `store`.
    pub fn new(store: Arc<EventStore>) -> Self {
        Self { store }
    }
}

impl std::fmt::Debug for EventStoreSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStoreSink").finish_non_exhaustive()
    }
}

impl WorktreeEventSink for EventStoreSink {
    fn emit(&self, session_id: &str, event: WorktreeEvent) {
        let event_type = event.event_type();
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(session_id, %event_type, error = %e, "failed to encode worktree event");
                return;
            }
        };
        let append = || {
            self.store.append(&AppendOptions {
                session_id,
                event_type,
                payload,
            })
        };
        let appended = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(append)
            }
            _ => append(),
        };
        if let Err(e) = appended {
            warn!(session_id, %event_type, error = %e, "failed to record worktree event");
        }
    }
}

/// Forwards events over an unbounded channel.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: UnboundedSender<(String, WorktreeEvent)>,
}

impl ChannelSink {
    /// Sink feeding `tx`.
    pub fn new(tx: UnboundedSender<(String, WorktreeEvent)>) -> Self {
        Self { tx }
    }
}

impl WorktreeEventSink for ChannelSink {
    fn emit(&self, session_id: &str, event: WorktreeEvent) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send((session_id.to_string(), event));
    }
}
