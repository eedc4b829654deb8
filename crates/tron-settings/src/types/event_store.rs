use serde::{Deserialize, Serialize};

/// Event store database settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventStoreSettings {
    /// Database file path. `~` expands to the home directory.
    pub db_path: String,
    /// Maximum pooled connections for file-backed databases.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// How many times an append recomputes its sequence after losing a
    /// `(session_id, sequence)` race before giving up.
    pub sequence_conflict_retries: u32,
}

impl Default for EventStoreSettings {
    fn default() -> Self {
        Self {
            db_path: "~/.tron/database/events.db".to_string(),
            pool_size: 16,
            busy_timeout_ms: 30_000,
            sequence_conflict_retries: 5,
        }
    }
}

impl EventStoreSettings {
    /// Database path with a leading `~` expanded against `home`.
    pub fn resolved_db_path(&self, home: &str) -> std::path::PathBuf {
        match self.db_path.strip_prefix("~/") {
            Some(rest) => std::path::Path::new(home).join(rest),
            None => std::path::PathBuf::from(&self.db_path),
        }
    }
}
