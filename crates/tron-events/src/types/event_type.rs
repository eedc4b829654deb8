//! The event type table.
//!
//! Add or remove events here; everything else is generated by
//! [`define_events!`].

use super::base::SessionEvent;
use super::payloads::{config, context, error, message, metadata, session, streaming, tool, worktree};

/// Wire string used when an unrecognized type has to be rendered.
pub const UNRECOGNIZED_WIRE: &str = "unrecognized";

define_events! {
    events {
        /// New session started.
        SessionStart => "session.start" => session::SessionStartPayload,
        /// Session ended.
        SessionEnd => "session.end" => session::SessionEndPayload,
        /// Session forked from another session's history.
        SessionFork => "session.fork" => session::SessionForkPayload,
        /// Session rewound to an earlier sequence.
        SessionRewind => "session.rewind" => session::SessionRewindPayload,
        /// User message.
        MessageUser => "message.user" => message::UserMessagePayload,
        /// Assistant (model) message.
        MessageAssistant => "message.assistant" => message::AssistantMessagePayload,
        /// System-injected message.
        MessageSystem => "message.system" => message::SystemMessagePayload,
        /// Message soft-deleted.
        MessageDeleted => "message.deleted" => message::MessageDeletedPayload,
        /// Tool call from the model.
        ToolCall => "tool.call" => tool::ToolCallPayload,
        /// Tool execution result.
        ToolResult => "tool.result" => tool::ToolResultPayload,
        /// Turn started streaming.
        StreamTurnStart => "stream.turn_start" => streaming::StreamTurnStartPayload,
        /// Turn finished streaming.
        StreamTurnEnd => "stream.turn_end" => streaming::StreamTurnEndPayload,
        /// Text delta during streaming.
        StreamTextDelta => "stream.text_delta" => streaming::StreamDeltaPayload,
        /// Thinking delta during streaming.
        StreamThinkingDelta => "stream.thinking_delta" => streaming::StreamDeltaPayload,
        /// Model switched.
        ConfigModelSwitch => "config.model_switch" => config::ConfigModelSwitchPayload,
        /// System prompt updated.
        ConfigPromptUpdate => "config.prompt_update" => config::ConfigPromptUpdatePayload,
        /// Reasoning level changed.
        ConfigReasoningLevel => "config.reasoning_level" => config::ConfigReasoningLevelPayload,
        /// Compaction boundary marker.
        CompactBoundary => "compact.boundary" => context::CompactBoundaryPayload,
        /// Compaction summary.
        CompactSummary => "compact.summary" => context::CompactSummaryPayload,
        /// Context cleared.
        ContextCleared => "context.cleared" => context::ContextClearedPayload,
        /// Skill activated.
        SkillAdded => "skill.added" => metadata::SkillAddedPayload,
        /// Skill deactivated.
        SkillRemoved => "skill.removed" => metadata::SkillRemovedPayload,
        /// Session metadata updated.
        MetadataUpdate => "metadata.update" => metadata::MetadataUpdatePayload,
        /// Session tag added or removed.
        MetadataTag => "metadata.tag" => metadata::MetadataTagPayload,
        /// Working directory acquired.
        WorktreeAcquired => "worktree.acquired" => worktree::WorktreeAcquiredPayload,
        /// Commit made in the session's working directory.
        WorktreeCommit => "worktree.commit" => worktree::WorktreeCommitPayload,
        /// Working directory released.
        WorktreeReleased => "worktree.released" => worktree::WorktreeReleasedPayload,
        /// Session branch merged.
        WorktreeMerged => "worktree.merged" => worktree::WorktreeMergedPayload,
        /// Agent-level error.
        ErrorAgent => "error.agent" => error::ErrorAgentPayload,
        /// Tool execution error.
        ErrorTool => "error.tool" => error::ErrorToolPayload,
        /// Provider error.
        ErrorProvider => "error.provider" => error::ErrorProviderPayload,
    }
    domain_groups {
        /// `session.*`
        is_session_type => [SessionStart, SessionEnd, SessionFork, SessionRewind],
        /// Events that may open a session's log at sequence 0.
        is_session_root => [SessionStart, SessionFork],
        /// `message.user|assistant|system`
        is_message_type => [MessageUser, MessageAssistant, MessageSystem],
        /// `stream.*`
        is_streaming_type => [StreamTurnStart, StreamTurnEnd, StreamTextDelta, StreamThinkingDelta],
        /// `config.*`
        is_config_type => [ConfigModelSwitch, ConfigPromptUpdate, ConfigReasoningLevel],
        /// Events that hide earlier message content from reconstruction.
        is_context_boundary => [CompactSummary, ContextCleared],
        /// `worktree.*`
        is_worktree_type => [WorktreeAcquired, WorktreeCommit, WorktreeReleased, WorktreeMerged],
        /// `error.*`
        is_error_type => [ErrorAgent, ErrorTool, ErrorProvider],
        /// Events a `message.deleted` may target.
        is_deletable => [MessageUser, MessageAssistant, ToolResult],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn wire_names_are_unique_and_roundtrip() {
        let mut seen = HashSet::new();
        for et in ALL_EVENT_TYPES {
            assert!(seen.insert(et.as_str()), "duplicate wire name {et}");
            assert_eq!(et.as_str().parse::<EventType>().unwrap(), et);
            let json = serde_json::to_string(&et).unwrap();
            assert_eq!(serde_json::from_str::<EventType>(&json).unwrap(), et);
        }
    }

    #[test]
    fn unknown_discriminant_deserializes_to_unrecognized() {
        let et: EventType = serde_json::from_str("\"hook.triggered\"").unwrap();
        assert_eq!(et, EventType::Unrecognized);
        assert!(!et.is_recognized());
        assert_eq!(EventType::from_wire("memory.ledger"), EventType::Unrecognized);
    }

    #[test]
    fn strict_parse_rejects_unknown() {
        let err = "nope.nope".parse::<EventType>().unwrap_err();
        assert_eq!(err, "unknown event type: nope.nope");
        assert!(UNRECOGNIZED_WIRE.parse::<EventType>().is_err());
    }

    #[test]
    fn domains() {
        assert_eq!(EventType::SessionRewind.domain(), "session");
        assert_eq!(EventType::WorktreeMerged.domain(), "worktree");
        assert_eq!(EventType::Unrecognized.domain(), "unrecognized");
    }

    #[test]
    fn groups() {
        assert!(EventType::SessionFork.is_session_root());
        assert!(!EventType::SessionRewind.is_session_root());
        assert!(EventType::CompactSummary.is_context_boundary());
        assert!(!EventType::CompactBoundary.is_context_boundary());
        assert!(EventType::ToolResult.is_deletable());
        assert!(!EventType::ToolCall.is_deletable());
        assert!(EventType::WorktreeCommit.is_worktree_type());
    }
}
