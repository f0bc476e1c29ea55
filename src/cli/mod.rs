//! CLI interface using clap.
//!
//! Provides command-line arguments and subcommands for the tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Memo Sync - Auto-sync calendar memos to a backup target.
#[derive(Parser, Debug)]
#[command(name = "memo-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (use multiple times for more verbosity).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file path (defaults to ~/.memo-sync/config.toml).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sync daemon in the foreground.
    Run,

    /// Sync now, regardless of the enabled flag.
    Sync,

    /// Show sync state, settings, and service status.
    Status,

    /// Turn auto-sync on.
    Enable,

    /// Turn auto-sync off.
    Disable,

    /// Set the periodic sync interval.
    Interval {
        /// Interval in minutes (0 disables the periodic trigger).
        minutes: u64,
    },

    /// Show or set the backup file name prefix.
    Prefix {
        /// New prefix; omit to show the current one.
        name: Option<String>,
    },

    /// Manage calendar memos.
    Memo {
        #[command(subcommand)]
        action: MemoAction,
    },

    /// Restore memos from a backup file.
    Restore {
        /// Path to a backup JSON file.
        file: PathBuf,
    },

    /// Show the paths being used.
    Paths,

    /// Manage the background systemd service.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum MemoAction {
    /// Add a memo under a date.
    Add {
        /// Date in YYYY-MM-DD form.
        date: String,
        /// Memo text.
        text: String,
    },

    /// Remove all memos under a date.
    Remove {
        /// Date in YYYY-MM-DD form.
        date: String,
    },

    /// List all memos.
    List,

    /// Delete all memos.
    Clear,
}

#[derive(Subcommand, Debug)]
pub enum ServiceAction {
    /// Install and start the systemd user service.
    Install,

    /// Stop and remove the systemd user service.
    Uninstall,

    /// Show service status.
    Status,

    /// Show recent service logs.
    Logs {
        /// Number of log lines to show.
        #[arg(short = 'n', long, default_value = "50")]
        lines: usize,
    },
}
