//! Typed payload definitions for each [`EventType`](super::EventType) variant.
//!
//! Payloads are stored as opaque JSON; these structs give callers a typed view
//! and give producers a single place to build well-formed payloads. All use
//! `camelCase` field names on the wire.

pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod metadata;
pub mod session;
pub mod streaming;
pub mod token_usage;
pub mod tool;
pub mod worktree;

pub use token_usage::TokenUsage;
