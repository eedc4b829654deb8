use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// When a session gets its own git worktree instead of the main checkout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    /// Every session shares the main directory.
    Never,
    /// Every session gets an isolated worktree.
    Always,
    /// First session on a repo takes the main directory, later ones are isolated.
    #[default]
    Lazy,
}

impl IsolationMode {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Always => "always",
            Self::Lazy => "lazy",
        }
    }
}

impl fmt::Display for IsolationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "lazy" => Ok(Self::Lazy),
            other => Err(format!("unknown isolation mode: {other}")),
        }
    }
}

/// How an isolated branch is folded into its target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// `git merge --no-ff`: keeps the session branch history.
    #[default]
    Merge,
    /// `git merge --squash` followed by a single commit.
    Squash,
}

impl MergeStrategy {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Squash => "squash",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merge" => Ok(Self::Merge),
            "squash" => Ok(Self::Squash),
            other => Err(format!("unknown merge strategy: {other}")),
        }
    }
}

/// Worktree coordinator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorktreeSettings {
    /// Isolation policy mode.
    pub isolation_mode: IsolationMode,
    /// Directory under the repository root holding session worktrees.
    pub base_dir_name: String,
    /// Prefix for session branch names.
    pub branch_prefix: String,
    /// Commit pending changes when a session releases its directory.
    pub auto_commit_on_release: bool,
    /// Remove isolated worktree directories on release.
    pub delete_worktree_on_release: bool,
    /// Keep session branches after their worktree is removed.
    pub preserve_branches: bool,
    /// Remove orphaned worktrees after recovering their changes.
    pub delete_on_recovery: bool,
    /// Extra attempts for a failed release commit.
    pub commit_retries: u32,
    /// Upper bound on any single git invocation, in milliseconds.
    pub command_timeout_ms: u64,
    /// Strategy used when a merge request names none.
    pub default_merge_strategy: MergeStrategy,
}

impl Default for WorktreeSettings {
    fn default() -> Self {
        Self {
            isolation_mode: IsolationMode::Lazy,
            base_dir_name: ".worktrees".to_string(),
            branch_prefix: "session/".to_string(),
            auto_commit_on_release: true,
            delete_worktree_on_release: true,
            preserve_branches: true,
            delete_on_recovery: true,
            commit_retries: 2,
            command_timeout_ms: 30_000,
            default_merge_strategy: MergeStrategy::Merge,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_mode_wire_names() {
        for mode in [IsolationMode::Never, IsolationMode::Always, IsolationMode::Lazy] {
            let json = serde_json::to_string(&mode).unwrap();
            assert_eq!(json, format!("\"{mode}\""));
            assert_eq!(mode.as_str().parse::<IsolationMode>().unwrap(), mode);
        }
    }

    #[test]
    fn isolation_mode_parse_is_case_insensitive() {
        assert_eq!("ALWAYS".parse::<IsolationMode>().unwrap(), IsolationMode::Always);
        assert!("sometimes".parse::<IsolationMode>().is_err());
    }

    #[test]
    fn merge_strategy_roundtrip() {
        assert_eq!("squash".parse::<MergeStrategy>().unwrap(), MergeStrategy::Squash);
        assert_eq!(MergeStrategy::default().to_string(), "merge");
        assert!("rebase".parse::<MergeStrategy>().is_err());
    }

    #[test]
    fn worktree_defaults() {
        let w = WorktreeSettings::default();
        assert_eq!(w.commit_retries, 2);
        assert_eq!(w.command_timeout_ms, 30_000);
        assert!(w.delete_on_recovery);
        assert!(w.preserve_branches);
    }
}
