//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TronSettings::default()`]
//! 2. If `~/.tron/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{IsolationMode, TronSettings};

/// Resolve the user's home directory, falling back to `/tmp`.
pub fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string())
}

/// Resolve the path to the settings file (`~/.tron/settings.json`).
pub fn settings_path() -> PathBuf {
    PathBuf::from(home_dir()).join(".tron").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TronSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<TronSettings> {
    let defaults = serde_json::to_value(TronSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TronSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Reject settings the store or coordinator cannot run with.
pub fn validate(settings: &TronSettings) -> Result<()> {
    if settings.event_store.pool_size == 0 {
        return Err(SettingsError::InvalidValue(
            "eventStore.poolSize must be at least 1".into(),
        ));
    }
    let base = &settings.worktree.base_dir_name;
    if base.is_empty() || base.contains('/') || base == "." || base == ".." {
        return Err(SettingsError::InvalidValue(format!(
            "worktree.baseDirName must be a single directory name, got {base:?}"
        )));
    }
    if settings.worktree.branch_prefix.contains(char::is_whitespace) {
        return Err(SettingsError::InvalidValue(
            "worktree.branchPrefix must not contain whitespace".into(),
        ));
    }
    if settings.worktree.command_timeout_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "worktree.commandTimeoutMs must be positive".into(),
        ));
    }
    Ok(())
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut TronSettings) {
    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("TRON_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Event store ─────────────────────────────────────────────────
    if let Some(v) = read_env_string("TRON_DB_PATH") {
        settings.event_store.db_path = v;
    }
    if let Some(v) = read_env_u64("TRON_DB_BUSY_TIMEOUT_MS", 100, 600_000) {
        settings.event_store.busy_timeout_ms = v;
    }

    // ── Worktree ────────────────────────────────────────────────────
    if let Some(v) = read_env_isolation_mode("TRON_ISOLATION_MODE") {
        settings.worktree.isolation_mode = v;
    }
    if let Some(v) = read_env_string("TRON_WORKTREE_DIR") {
        settings.worktree.base_dir_name = v;
    }
    if let Some(v) = read_env_string("TRON_BRANCH_PREFIX") {
        settings.worktree.branch_prefix = v;
    }
    if let Some(v) = read_env_bool("TRON_AUTO_COMMIT") {
        settings.worktree.auto_commit_on_release = v;
    }
    if let Some(v) = read_env_u64("TRON_WORKTREE_TIMEOUT_MS", 1000, 3_600_000) {
        settings.worktree.command_timeout_ms = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_isolation_mode(name: &str) -> Option<IsolationMode> {
    let val = std::env::var(name).ok()?;
    match val.parse() {
        Ok(mode) => Some(mode),
        Err(e) => {
            tracing::warn!(key = name, value = %val, error = %e, "invalid isolation mode env var, ignoring");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MergeStrategy;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"worktree": {"commitRetries": 2, "branchPrefix": "session/"}});
        let source = serde_json::json!({"worktree": {"commitRetries": 4}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["worktree"]["commitRetries"], 4);
        assert_eq!(merged["worktree"]["branchPrefix"], "session/");
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(
            serde_json::json!({"items": [1, 2, 3]}),
            serde_json::json!({"items": [4, 5]}),
        );
        assert_eq!(merged["items"], serde_json::json!([4, 5]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(
            serde_json::json!({"a": 1, "b": 2}),
            serde_json::json!({"a": null}),
        );
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(
            serde_json::json!({"a": {"nested": true}}),
            serde_json::json!({"a": 42}),
        );
        assert_eq!(merged["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.worktree.base_dir_name, ".worktrees");
        assert_eq!(settings.event_store.pool_size, 16);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"worktree": {"defaultMergeStrategy": "squash", "commitRetries": 0}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.worktree.default_merge_strategy, MergeStrategy::Squash);
        assert_eq!(settings.worktree.commit_retries, 0);
        assert!(settings.worktree.auto_commit_on_release);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = load_settings_from_path(&path);
        assert!(matches!(result.unwrap_err(), SettingsError::Json(_)));
    }

    #[test]
    fn load_unknown_isolation_mode_is_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"worktree": {"isolationMode": "sometimes"}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::Json(_)
        ));
    }

    #[test]
    fn load_rejects_nested_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"worktree": {"baseDirName": "a/b"}}"#).unwrap();

        assert!(matches!(
            load_settings_from_path(&path).unwrap_err(),
            SettingsError::InvalidValue(_)
        ));
    }

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_rejects_zero_pool() {
        let mut settings = TronSettings::default();
        settings.event_store.pool_size = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_accepts_defaults() {
        assert!(validate(&TronSettings::default()).is_ok());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE", "Yes"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "OFF"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("700000", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 600_000), None);
    }
}
