//! # tron-agent
//!
//! Command-line front end over the session runtime: inspect, fork and rewind
//! session logs, and list or recover session worktrees.

#![deny(unsafe_code)]

mod db_path;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tron_events::{EventRange, EventStore, SearchOptions};
use tron_runtime::{SessionFilter, SessionManager};
use tron_settings::TronSettings;

/// Tron session backbone CLI.
#[derive(Parser, Debug)]
#[command(name = "tron-agent", about = "Inspect and manage Tron sessions")]
struct Cli {
    /// Path to the `SQLite` event database (overrides settings).
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Settings file (defaults to `~/.tron/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a session.
    New {
        /// Model name.
        #[arg(long)]
        model: String,
        /// Working directory.
        #[arg(long)]
        dir: String,
        /// Title.
        #[arg(long)]
        title: Option<String>,
    },
    /// List sessions.
    List {
        /// Include ended sessions.
        #[arg(long)]
        all: bool,
        /// Only sessions in this workspace path.
        #[arg(long)]
        workspace: Option<String>,
        /// Maximum rows.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print reconstructed session state.
    Show {
        /// Session ID.
        session_id: String,
        /// Replay only up to this sequence.
        #[arg(long)]
        as_of: Option<i64>,
    },
    /// Print a session's own events.
    Events {
        /// Session ID.
        session_id: String,
        /// First sequence.
        #[arg(long)]
        from: Option<i64>,
        /// Last sequence.
        #[arg(long)]
        to: Option<i64>,
    },
    /// Fork a session.
    Fork {
        /// Source session ID.
        session_id: String,
        /// Last inherited sequence (defaults to the latest).
        #[arg(long)]
        at: Option<i64>,
        /// Title for the fork.
        #[arg(long)]
        title: Option<String>,
    },
    /// Rewind a session's visible history.
    Rewind {
        /// Session ID.
        session_id: String,
        /// Last sequence that stays visible.
        to_sequence: i64,
    },
    /// Full-text search over message and tool text.
    Search {
        /// FTS query.
        query: String,
        /// Restrict to one session.
        #[arg(long)]
        session: Option<String>,
        /// Maximum results.
        #[arg(long)]
        limit: Option<i64>,
    },
    /// List git worktrees of a repository.
    Worktrees {
        /// Repository path.
        #[arg(default_value = ".")]
        repo: PathBuf,
    },
    /// Commit and clean up session worktrees no running process owns.
    Recover {
        /// Repository path.
        #[arg(default_value = ".")]
        repo: PathBuf,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_settings(path: Option<&PathBuf>) -> Result<TronSettings> {
    match path {
        Some(path) => tron_settings::load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => tron_settings::load_settings().context("Failed to load settings"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = load_settings(cli.settings.as_ref())?;
    tron_core::logging::init_subscriber(&settings.logging.level);

    let db_path =
        db_path::resolve_db_path_for_home(cli.db_path, &settings.event_store, &db_path::home_dir())?;
    let store = EventStore::open(&db_path, &settings.event_store)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    let manager = SessionManager::new(Arc::new(store), settings.worktree.clone());

    match cli.command {
        Command::New { model, dir, title } => {
            print_json(&manager.create_session(&model, &dir, title.as_deref())?)
        }
        Command::List {
            all,
            workspace,
            limit,
        } => print_json(&manager.list_sessions(&SessionFilter {
            workspace_path: workspace,
            include_ended: all,
            parent_session_id: None,
            limit,
        })?),
        Command::Show { session_id, as_of } => {
            print_json(&*manager.get_state(&session_id, as_of)?)
        }
        Command::Events {
            session_id,
            from,
            to,
        } => print_json(&manager.event_store().get_events(
            &session_id,
            &EventRange {
                from,
                to,
                limit: None,
            },
        )?),
        Command::Fork {
            session_id,
            at,
            title,
        } => {
            let fork = manager.fork_session(&session_id, at, title).await?;
            print_json(&fork.session)
        }
        Command::Rewind {
            session_id,
            to_sequence,
        } => print_json(&*manager.rewind_session(&session_id, to_sequence)?),
        Command::Search {
            query,
            session,
            limit,
        } => print_json(&manager.event_store().search(
            &query,
            &SearchOptions {
                session_id: session,
                limit,
            },
        )?),
        Command::Worktrees { repo } => {
            print_json(&manager.worktrees().list_git_worktrees(&repo).await?)
        }
        Command::Recover { repo } => print_json(&manager.recover_orphaned_worktrees(&repo).await),
    }
}
