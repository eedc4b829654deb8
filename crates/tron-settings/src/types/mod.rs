//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and implement
//! [`Default`] with production values. `#[serde(default)]` lets a partial
//! JSON file fill in only the fields it cares about.

mod event_store;
mod worktree;

pub use event_store::*;
pub use worktree::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "logging": { "level": "info" },
///   "worktree": { "isolationMode": "always" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TronSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Event store database settings.
    pub event_store: EventStoreSettings,
    /// Worktree isolation settings.
    pub worktree: WorktreeSettings,
}

impl Default for TronSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "tron".to_string(),
            logging: LoggingSettings::default(),
            event_store: EventStoreSettings::default(),
            worktree: WorktreeSettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`trace`, `debug`, `info`, `warn`, `error`) or a full
    /// `EnvFilter` directive.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}
