//! Database path resolution.
//!
//! `--db-path` wins over `eventStore.dbPath`; a leading `~/` expands against
//! `$HOME`. The parent directory is created on demand and a symlinked
//! database file is rejected.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tron_settings::EventStoreSettings;

/// `$HOME`, falling back to `/tmp`.
pub fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Resolve and prepare the database path for a specific home directory.
pub fn resolve_db_path_for_home(
    cli_db_path: Option<PathBuf>,
    settings: &EventStoreSettings,
    home: &Path,
) -> Result<PathBuf> {
    let path = cli_db_path.unwrap_or_else(|| settings.resolved_db_path(&home.to_string_lossy()));
    validate_db_path(&path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(path)
}

/// Reject paths that would open something other than a plain database file.
pub fn validate_db_path(db_path: &Path) -> Result<()> {
    if db_path.file_name().is_none() {
        anyhow::bail!("Invalid db path '{}': missing file name", db_path.display());
    }
    if let Ok(meta) = std::fs::symlink_metadata(db_path)
        && meta.file_type().is_symlink()
    {
        anyhow::bail!(
            "Invalid db path '{}': symlink DB files are not allowed",
            db_path.display()
        );
    }
    if db_path.is_dir() {
        anyhow::bail!("Invalid db path '{}': is a directory", db_path.display());
    }
    Ok(())
}
