//! # tron-settings
//!
//! Layered configuration for the Tron session backbone.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TronSettings::default()`]
//! 2. **User file**: `~/.tron/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TRON_*` overrides (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use tron_settings::get_settings;
//!
//! let settings = get_settings();
//! println!("isolation: {}", settings.worktree.isolation_mode);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

/// Global settings singleton.
static SETTINGS: OnceLock<TronSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.tron/settings.json` with env var
/// overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static TronSettings {
    SETTINGS.get_or_init(|| {
        load_settings().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            TronSettings::default()
        })
    })
}

/// Initialize the global settings with a specific value.
///
/// # Errors
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: TronSettings) -> std::result::Result<(), TronSettings> {
    SETTINGS.set(settings)
}
