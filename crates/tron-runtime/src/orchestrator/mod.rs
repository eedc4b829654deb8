//! Orchestrator modules: per-session composition of the event store and
//! worktree coordinator.

pub mod session_manager;
