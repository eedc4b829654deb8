//! Session reconstruction from an event chain.
//!
//! [`reconstruct_session`] is a pure fold over the ancestor chain of a head
//! event, ordered root first. Two processes given the same chain produce the
//! same [`Session`].
//!
//! 1. **Scan pass**: collect deleted targets, tool call arguments, reasoning
//!    level, system prompt, and the position of the latest context boundary
//!    (`compact.summary` or `context.cleared`).
//! 2. **Build pass**: build messages, skipping deleted targets and content
//!    before the boundary, merging consecutive same-role messages, and
//!    flushing tool results after the assistant turn that requested them.
//! 3. **Header fold**: model, provider, working directory, metadata, skills,
//!    worktree and lifecycle state.
//!
//! Events of type [`EventType::Unrecognized`] are skipped by every pass.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::types::base::SessionEvent;
use crate::types::payloads::TokenUsage;
use crate::types::state::{Message, MessageWithEventId, Session, SessionMetadata, WorktreeState};
use crate::types::EventType;

/// Prefix of the synthetic user message injected at a compaction boundary.
pub const COMPACTION_SUMMARY_PREFIX: &str = "[Context from earlier in this conversation]";
/// Synthetic assistant acknowledgement following a compaction summary.
pub const COMPACTION_ACK_TEXT: &str =
    "I understand the previous context. Let me continue helping you.";
/// Content of the synthetic result injected for a tool call that never got one.
pub const INTERRUPTED_TOOL_TEXT: &str = "Tool execution was interrupted.";

/// Rebuild the projection of `session_id` from its ancestor chain.
///
/// `chain` runs from the root `session.start` to the head event, following
/// `parent_id` links, so it may begin in another session when
/// `session_id` is a fork. Returns `None` for an empty chain.
pub fn reconstruct_session(session_id: &str, chain: &[SessionEvent]) -> Option<Session> {
    let head = chain.last()?;
    let scan = scan_chain(chain);
    let built = build_messages(chain, &scan);
    let header = fold_header(session_id, chain);

    Some(Session {
        id: session_id.to_string(),
        working_directory: header.working_directory,
        model: header.model,
        provider: header.provider,
        system_prompt: scan.system_prompt,
        messages: built.messages,
        created_at: header.created_at.unwrap_or_else(|| head.timestamp.clone()),
        last_activity_at: head.timestamp.clone(),
        is_active: header.ended_at.is_none(),
        ended_at: header.ended_at,
        token_usage: built.tokens,
        metadata: header.metadata,
        turn_count: built.turn_count,
        reasoning_level: scan.reasoning_level,
        active_skills: header.active_skills,
        worktree: header.worktree,
        head_sequence: head.sequence,
        head_event_id: head.id.clone(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Scan pass
// ─────────────────────────────────────────────────────────────────────────────

struct Scan {
    deleted_event_ids: HashSet<String>,
    tool_call_args: HashMap<String, Value>,
    reasoning_level: Option<String>,
    system_prompt: Option<String>,
    /// Index into the chain of the latest context boundary.
    boundary: Option<usize>,
}

fn scan_chain(chain: &[SessionEvent]) -> Scan {
    let mut scan = Scan {
        deleted_event_ids: HashSet::new(),
        tool_call_args: HashMap::new(),
        reasoning_level: None,
        system_prompt: None,
        boundary: None,
    };

    for (idx, event) in chain.iter().enumerate() {
        match event.event_type {
            EventType::MessageDeleted => {
                if let Some(target) = event.payload_str("targetEventId") {
                    let _ = scan.deleted_event_ids.insert(target.to_string());
                }
            }
            EventType::ToolCall => {
                let id = event.payload_str("toolCallId");
                let args = event.payload.get("arguments");
                if let (Some(id), Some(args)) = (id, args) {
                    let _ = scan.tool_call_args.insert(id.to_string(), args.clone());
                }
            }
            EventType::ConfigReasoningLevel => {
                scan.reasoning_level = event.payload_str("newLevel").map(String::from);
            }
            EventType::SessionStart => {
                if let Some(prompt) = event.payload_str("systemPrompt") {
                    scan.system_prompt = Some(prompt.to_string());
                }
            }
            EventType::ConfigPromptUpdate => {
                if let Some(content) = event.payload_str("content") {
                    scan.system_prompt = Some(content.to_string());
                } else if let Some(hash) = event.payload_str("newHash") {
                    scan.system_prompt = Some(format!("[Updated prompt - hash: {hash}]"));
                }
            }
            EventType::CompactSummary | EventType::ContextCleared => {
                scan.boundary = Some(idx);
            }
            _ => {}
        }
    }
    scan
}

// ─────────────────────────────────────────────────────────────────────────────
// Build pass
// ─────────────────────────────────────────────────────────────────────────────

struct PendingToolResult {
    tool_call_id: String,
    content: String,
    is_error: bool,
}

struct BuildState {
    combined: Vec<MessageWithEventId>,
    tokens: TokenUsage,
    turn_count: i64,
    pending_tool_results: Vec<PendingToolResult>,
}

struct Built {
    messages: Vec<MessageWithEventId>,
    tokens: TokenUsage,
    turn_count: i64,
}

fn build_messages(chain: &[SessionEvent], scan: &Scan) -> Built {
    let mut st = BuildState {
        combined: Vec::new(),
        tokens: TokenUsage::default(),
        turn_count: 0,
        pending_tool_results: Vec::new(),
    };

    for (idx, event) in chain.iter().enumerate() {
        if scan.deleted_event_ids.contains(&event.id) {
            continue;
        }

        // Usage and turns are cumulative over the whole chain, boundaries
        // only hide content.
        if matches!(event.event_type, EventType::MessageUser | EventType::MessageAssistant) {
            track_usage(event, &mut st);
        }

        let before_boundary = scan.boundary.is_some_and(|b| idx < b);
        if before_boundary {
            continue;
        }

        match event.event_type {
            EventType::CompactSummary => push_compaction_pair(event, &mut st),
            EventType::ContextCleared => {}
            EventType::ToolResult => handle_tool_result(event, &mut st),
            EventType::MessageUser => handle_message_user(event, &mut st),
            EventType::MessageAssistant => handle_message_assistant(event, scan, &mut st),
            _ => {}
        }
    }

    if !st.pending_tool_results.is_empty()
        && st
            .combined
            .last()
            .is_some_and(|last| last.message.role == "assistant" && content_has_tool_use(&last.message.content))
    {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    inject_missing_tool_results(&mut st.combined);

    Built {
        messages: st.combined,
        tokens: st.tokens,
        turn_count: st.turn_count,
    }
}

fn track_usage(event: &SessionEvent, st: &mut BuildState) {
    if let Some(usage) = TokenUsage::from_payload(&event.payload) {
        st.tokens += &usage;
    }
    if event.event_type == EventType::MessageAssistant {
        if let Some(turn) = event.payload.get("turn").and_then(Value::as_i64) {
            st.turn_count = st.turn_count.max(turn);
        }
    }
}

/// The boundary itself is the first visible event, so `combined` is empty
/// here.
fn push_compaction_pair(event: &SessionEvent, st: &mut BuildState) {
    let summary = event.payload_str("summary").unwrap_or("");
    st.combined.push(MessageWithEventId {
        message: Message {
            role: "user".to_string(),
            content: Value::String(format!("{COMPACTION_SUMMARY_PREFIX}\n\n{summary}")),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
    st.combined.push(MessageWithEventId {
        message: Message {
            role: "assistant".to_string(),
            content: serde_json::json!([{ "type": "text", "text": COMPACTION_ACK_TEXT }]),
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![None],
    });
}

fn handle_tool_result(event: &SessionEvent, st: &mut BuildState) {
    st.pending_tool_results.push(PendingToolResult {
        tool_call_id: event.payload_str("toolCallId").unwrap_or("").to_string(),
        content: event.payload_str("content").unwrap_or("").to_string(),
        is_error: event
            .payload
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    });
}

/// A user message discards results that no assistant turn picked up.
fn handle_message_user(event: &SessionEvent, st: &mut BuildState) {
    st.pending_tool_results.clear();

    let content = event.payload.get("content").cloned().unwrap_or(Value::Null);

    if let Some(last) = st
        .combined
        .last_mut()
        .filter(|last| last.message.role == "user")
    {
        last.message.content = merge_message_content(&last.message.content, &content, "user");
        last.event_ids.push(Some(event.id.clone()));
        return;
    }

    st.combined.push(MessageWithEventId {
        message: Message {
            role: "user".to_string(),
            content,
            tool_call_id: None,
            is_error: None,
        },
        event_ids: vec![Some(event.id.clone())],
    });
}

fn handle_message_assistant(event: &SessionEvent, scan: &Scan, st: &mut BuildState) {
    let content = event.payload.get("content").cloned().unwrap_or(Value::Null);
    let restored = restore_truncated_inputs(&content, &scan.tool_call_args);
    let has_tool_use = content_has_tool_use(&restored);

    // Results of the previous assistant turn come before this one.
    if st.combined.last().is_some_and(|e| e.message.role == "assistant")
        && !st.pending_tool_results.is_empty()
    {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }

    if let Some(last) = st
        .combined
        .last_mut()
        .filter(|last| last.message.role == "assistant")
    {
        last.message.content = merge_message_content(&last.message.content, &restored, "assistant");
        last.event_ids.push(Some(event.id.clone()));
    } else {
        st.combined.push(MessageWithEventId {
            message: Message {
                role: "assistant".to_string(),
                content: restored,
                tool_call_id: None,
                is_error: None,
            },
            event_ids: vec![Some(event.id.clone())],
        });
    }

    if has_tool_use && !st.pending_tool_results.is_empty() {
        flush_tool_results(&mut st.combined, &mut st.pending_tool_results);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header fold
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Header {
    working_directory: String,
    model: String,
    provider: Option<String>,
    created_at: Option<String>,
    ended_at: Option<String>,
    metadata: SessionMetadata,
    active_skills: Vec<String>,
    worktree: Option<WorktreeState>,
}

/// Lifecycle and worktree state only come from the session's own events;
/// everything else is inherited through the chain.
fn fold_header(session_id: &str, chain: &[SessionEvent]) -> Header {
    let mut h = Header::default();

    for event in chain {
        let own = event.session_id == session_id;
        if own && h.created_at.is_none() {
            h.created_at = Some(event.timestamp.clone());
        }

        match event.event_type {
            EventType::SessionStart => {
                if let Some(dir) = event.payload_str("workingDirectory") {
                    h.working_directory = dir.to_string();
                }
                if let Some(model) = event.payload_str("model") {
                    h.model = model.to_string();
                }
                h.provider = event.payload_str("provider").map(String::from);
                h.metadata.title = event.payload_str("title").map(String::from);
                h.metadata.tags = event
                    .payload
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| {
                        tags.iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
            }
            EventType::SessionFork => {
                if let Some(name) = event.payload_str("name") {
                    h.metadata.title = Some(name.to_string());
                }
                if let Some(model) = event.payload_str("model") {
                    h.model = model.to_string();
                }
                if own {
                    h.metadata.parent_session_id =
                        event.payload_str("sourceSessionId").map(String::from);
                    h.metadata.fork_from_index =
                        event.payload.get("sourceSequence").and_then(Value::as_i64);
                }
            }
            EventType::SessionEnd if own => {
                h.ended_at = Some(event.timestamp.clone());
            }
            EventType::ConfigModelSwitch => {
                if let Some(model) = event.payload_str("newModel") {
                    h.model = model.to_string();
                }
                if let Some(provider) = event.payload_str("provider") {
                    h.provider = Some(provider.to_string());
                }
            }
            EventType::MetadataUpdate => {
                if event.payload_str("key") == Some("title") {
                    h.metadata.title = event
                        .payload
                        .get("newValue")
                        .and_then(Value::as_str)
                        .map(String::from);
                }
            }
            EventType::MetadataTag => apply_tag(&mut h.metadata.tags, &event.payload),
            EventType::SkillAdded => {
                if let Some(name) = event.payload_str("skillName") {
                    if !h.active_skills.iter().any(|s| s == name) {
                        h.active_skills.push(name.to_string());
                    }
                }
            }
            EventType::SkillRemoved => {
                if let Some(name) = event.payload_str("skillName") {
                    h.active_skills.retain(|s| s != name);
                }
            }
            EventType::WorktreeAcquired if own => {
                h.worktree = Some(WorktreeState {
                    path: event.payload_str("path").unwrap_or("").to_string(),
                    branch: event.payload_str("branch").unwrap_or("none").to_string(),
                    base_commit: event.payload_str("baseCommit").unwrap_or("").to_string(),
                    isolated: event
                        .payload
                        .get("isolated")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                    last_commit: None,
                    released: false,
                });
            }
            EventType::WorktreeCommit if own => {
                if let (Some(wt), Some(hash)) = (h.worktree.as_mut(), event.payload_str("commitHash")) {
                    wt.last_commit = Some(hash.to_string());
                }
            }
            EventType::WorktreeReleased if own => {
                if let Some(wt) = h.worktree.as_mut() {
                    wt.released = true;
                    if let Some(hash) = event.payload_str("finalCommit") {
                        wt.last_commit = Some(hash.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    h
}

fn apply_tag(tags: &mut Vec<String>, payload: &Value) {
    let Some(tag) = payload.get("tag").and_then(Value::as_str) else {
        return;
    };
    match payload.get("action").and_then(Value::as_str) {
        Some("add") => {
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        Some("remove") => tags.retain(|t| t != tag),
        _ => {}
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Give every `tool_use` block without a following result a synthetic error
/// result, placed right after its assistant message.
fn inject_missing_tool_results(combined: &mut Vec<MessageWithEventId>) {
    let mut insertions: Vec<(usize, Vec<MessageWithEventId>)> = Vec::new();

    for (i, entry) in combined.iter().enumerate() {
        if entry.message.role != "assistant" {
            continue;
        }
        let tool_use_ids = extract_tool_use_ids(&entry.message.content);
        if tool_use_ids.is_empty() {
            continue;
        }

        let matched: HashSet<&str> = combined[i + 1..]
            .iter()
            .take_while(|m| m.message.role == "toolResult")
            .filter_map(|m| m.message.tool_call_id.as_deref())
            .collect();

        let synthetic: Vec<MessageWithEventId> = tool_use_ids
            .into_iter()
            .filter(|id| !matched.contains(id.as_str()))
            .map(|id| MessageWithEventId {
                message: Message {
                    role: "toolResult".to_string(),
                    content: Value::String(INTERRUPTED_TOOL_TEXT.to_string()),
                    tool_call_id: Some(id),
                    is_error: Some(true),
                },
                event_ids: vec![None],
            })
            .collect();

        if !synthetic.is_empty() {
            insertions.push((i + 1, synthetic));
        }
    }

    // Reverse order keeps earlier indices valid.
    for (idx, msgs) in insertions.into_iter().rev() {
        let _ = combined.splice(idx..idx, msgs);
    }
}

fn extract_tool_use_ids(content: &Value) -> Vec<String> {
    match content {
        Value::Array(arr) => arr
            .iter()
            .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_use"))
            .filter_map(|block| block.get("id").and_then(Value::as_str).map(String::from))
            .collect(),
        _ => vec![],
    }
}

fn flush_tool_results(combined: &mut Vec<MessageWithEventId>, pending: &mut Vec<PendingToolResult>) {
    for tr in pending.drain(..) {
        combined.push(MessageWithEventId {
            message: Message {
                role: "toolResult".to_string(),
                content: Value::String(tr.content),
                tool_call_id: Some(tr.tool_call_id),
                is_error: Some(tr.is_error),
            },
            event_ids: vec![None],
        });
    }
}

/// Concatenate two same-role contents, keeping block order.
fn merge_message_content(existing: &Value, incoming: &Value, role: &str) -> Value {
    let blocks = |v: &Value| -> Vec<Value> {
        if role == "user" {
            normalize_user_content(v)
        } else {
            match v {
                Value::Array(a) => a.clone(),
                _ => vec![],
            }
        }
    };
    let mut merged = blocks(existing);
    merged.extend(blocks(incoming));
    Value::Array(merged)
}

fn normalize_user_content(content: &Value) -> Vec<Value> {
    match content {
        Value::String(s) => vec![serde_json::json!({"type": "text", "text": s})],
        Value::Array(arr) => arr.clone(),
        _ => vec![],
    }
}

fn content_has_tool_use(content: &Value) -> bool {
    match content {
        Value::Array(arr) => arr
            .iter()
            .any(|block| block.get("type").and_then(Value::as_str) == Some("tool_use")),
        _ => false,
    }
}

/// Swap `{"_truncated": true}` tool inputs for the full arguments recorded
/// by the matching `tool.call`.
fn restore_truncated_inputs(content: &Value, tool_call_args: &HashMap<String, Value>) -> Value {
    let Value::Array(arr) = content else {
        return content.clone();
    };
    let restored = arr
        .iter()
        .map(|block| {
            let is_tool_use = block.get("type").and_then(Value::as_str) == Some("tool_use");
            let is_truncated = block
                .get("input")
                .and_then(|i| i.get("_truncated"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let full_args = block
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| tool_call_args.get(id));

            match full_args {
                Some(args) if is_tool_use && is_truncated => {
                    let mut block = block.clone();
                    block["input"] = args.clone();
                    block
                }
                _ => block.clone(),
            }
        })
        .collect();
    Value::Array(restored)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
