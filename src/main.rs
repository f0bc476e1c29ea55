//! Memo Sync - Auto-sync calendar memos to a backup target.
//!
//! Watches a local memo store and uploads JSON backups whenever the memo
//! data changes: bursts of edits are debounced, only one upload is ever in
//! flight, transient failures are retried, and a wall-clock trigger covers
//! changes made while nothing was listening.
//!
//! Common commands:
//!   memo-sync run                       # Run the sync daemon in the foreground
//!   memo-sync sync                      # Sync right now
//!   memo-sync status                    # Show sync state and settings
//!   memo-sync memo add 2025-08-25 "dentist 3pm"
//!   memo-sync restore backup.json      # Restore memos from a backup
//!   memo-sync service install          # Run as a systemd user service

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::backup_service::{self, SyncOutcome};
use application::{restore_service, LogSink, StatusSink, SyncCoordinator};
use cli::{Cli, Commands, MemoAction, ServiceAction};
use domain::{AppConfig, AppError, ChangeEvent, ChangeReason};
use infrastructure::{build_target, MemoStore, SystemdService};

fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
fn run(cli: Cli) -> domain::Result<()> {
    let config = match &cli.config {
        Some(path) => infrastructure::load_config_from_file(path)?,
        None => infrastructure::load_config()?,
    };

    match cli.command {
        Commands::Run => cmd_run(&config),
        Commands::Sync => cmd_sync(&config),
        Commands::Status => cmd_status(&config),
        Commands::Enable => cmd_set_enabled(&config, true),
        Commands::Disable => cmd_set_enabled(&config, false),
        Commands::Interval { minutes } => cmd_interval(&config, minutes),
        Commands::Prefix { name } => cmd_prefix(&config, name.as_deref()),
        Commands::Memo { action } => cmd_memo(&config, &action),
        Commands::Restore { file } => cmd_restore(&config, &file),
        Commands::Paths => cmd_paths(&config),
        Commands::Service { action } => cmd_service(&config, &action),
    }
}

fn open_store(config: &AppConfig) -> domain::Result<Arc<MemoStore>> {
    Ok(Arc::new(MemoStore::open(&config.store_db_path())?))
}

fn runtime() -> domain::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| AppError::io("Failed to start async runtime", e))
}

/// Run the sync daemon in the foreground.
fn cmd_run(config: &AppConfig) -> domain::Result<()> {
    infrastructure::ensure_config_exists()?;

    let store = open_store(config)?;
    let target = build_target(config)?;
    let sink: Arc<dyn StatusSink> = Arc::new(LogSink);

    runtime()?.block_on(async {
        let (coordinator, handle) = SyncCoordinator::new(
            Arc::clone(&store),
            target,
            sink,
            config.sync.clone(),
        )?;

        // Changes made through this process
        let mut changes = store.watch();
        let change_handle = handle.clone();
        tokio::spawn(async move {
            while let Some(event) = changes.recv().await {
                change_handle.change(event);
            }
        });

        // Changes written to the store by other processes
        let watcher_handle = handle.clone();
        let _watcher = infrastructure::watch_store_file(&config.store_db_path(), move || {
            watcher_handle.change(ChangeEvent::new(ChangeReason::Modified, None));
        })?;

        let task = tokio::spawn(coordinator.run());

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| AppError::io("Failed to wait for shutdown signal", e))?;
        tracing::info!("shutting down");
        handle.shutdown();
        let _ = task.await;

        Ok(())
    })
}

/// Sync immediately, bypassing the enabled flag.
fn cmd_sync(config: &AppConfig) -> domain::Result<()> {
    let store = open_store(config)?;
    let target = build_target(config)?;
    let sink: Arc<dyn StatusSink> = Arc::new(LogSink);

    let outcome = runtime()?
        .block_on(backup_service::sync_once(&store, &target, &sink, &config.sync))
        .map_err(AppError::Sync)?;

    match outcome {
        SyncOutcome::AlreadySynced => {
            println!("{} Already up to date", "✓".green().bold());
        }
        SyncOutcome::Synced { file_name } => {
            println!("{} Synced as {}", "✓".green().bold(), file_name.cyan());
        }
    }

    Ok(())
}

/// Show sync state, settings, and service status.
fn cmd_status(config: &AppConfig) -> domain::Result<()> {
    let store = open_store(config)?;
    let state = store.load_sync_state()?;
    let target = build_target(config)?;

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Setting", "Value"]);

    table.add_row(vec![
        "Auto-sync".to_string(),
        if state.enabled {
            "enabled".to_string()
        } else {
            "disabled".to_string()
        },
    ]);
    table.add_row(vec![
        "Interval".to_string(),
        format!("{} min", state.interval_ms / 60_000),
    ]);
    table.add_row(vec![
        "Last sync".to_string(),
        state.last_sync_at.map_or_else(
            || "never".to_string(),
            |t| {
                t.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S")
                    .to_string()
            },
        ),
    ]);
    table.add_row(vec![
        "Last synced hash".to_string(),
        state.last_synced_hash.unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec![
        "File prefix".to_string(),
        backup_service::effective_prefix(&store)?,
    ]);
    table.add_row(vec!["Target".to_string(), target.describe()]);

    let memos = store.memos()?;
    let memo_count: usize = memos.values().map(Vec::len).sum();
    table.add_row(vec![
        "Memos".to_string(),
        format!("{memo_count} across {} date(s)", memos.len()),
    ]);

    let service = SystemdService::new(config.clone());
    let service_status = service
        .get_status()
        .map_or_else(|_| "unknown".to_string(), |s| s.short_status().to_string());
    table.add_row(vec!["Service".to_string(), service_status]);

    println!("{table}");

    Ok(())
}

/// Turn auto-sync on or off.
fn cmd_set_enabled(config: &AppConfig, enabled: bool) -> domain::Result<()> {
    let store = open_store(config)?;
    store.set_auto_sync_enabled(enabled)?;

    if enabled {
        println!("{} Auto-sync enabled", "✓".green().bold());
    } else {
        println!("{} Auto-sync disabled", "✓".yellow().bold());
    }

    Ok(())
}

/// Set the periodic sync interval.
fn cmd_interval(config: &AppConfig, minutes: u64) -> domain::Result<()> {
    let store = open_store(config)?;
    store.set_sync_interval_ms(minutes * 60_000)?;

    if minutes == 0 {
        println!("{} Periodic sync disabled", "✓".yellow().bold());
    } else {
        println!("{} Sync interval set to {minutes} min", "✓".green().bold());
    }

    Ok(())
}

/// Show or set the backup file name prefix.
fn cmd_prefix(config: &AppConfig, name: Option<&str>) -> domain::Result<()> {
    let store = open_store(config)?;

    match name {
        Some(name) => {
            store.set_custom_file_name(name)?;
            println!(
                "{} File prefix set to {}",
                "✓".green().bold(),
                backup_service::effective_prefix(&store)?.cyan()
            );
        }
        None => {
            println!("{}", backup_service::effective_prefix(&store)?);
        }
    }

    Ok(())
}

/// Manage calendar memos.
fn cmd_memo(config: &AppConfig, action: &MemoAction) -> domain::Result<()> {
    let store = open_store(config)?;

    match action {
        MemoAction::Add { date, text } => {
            chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                AppError::Config {
                    message: format!("Invalid date '{date}', expected YYYY-MM-DD"),
                }
            })?;
            store.add_memo(date, text)?;
            println!("{} Added memo for {}", "✓".green().bold(), date.cyan());
        }
        MemoAction::Remove { date } => {
            let removed = store.remove_memos(date)?;
            if removed == 0 {
                println!("No memos found for {date}");
            } else {
                println!(
                    "{} Removed {removed} memo(s) for {}",
                    "✓".green().bold(),
                    date.cyan()
                );
            }
        }
        MemoAction::List => {
            let memos = store.memos()?;
            if memos.is_empty() {
                println!("No memos");
                return Ok(());
            }

            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(vec!["Date", "Memos"]);
            for (date, entries) in &memos {
                table.add_row(vec![date.clone(), entries.join("\n")]);
            }
            println!("{table}");
        }
        MemoAction::Clear => {
            let removed = store.clear_watched()?;
            if removed == 0 {
                println!("Nothing to clear");
            } else {
                println!("{} Cleared all memos", "✓".yellow().bold());
            }
        }
    }

    Ok(())
}

/// Restore memos from a backup file.
fn cmd_restore(config: &AppConfig, file: &Path) -> domain::Result<()> {
    let store = open_store(config)?;
    let result = restore_service::restore_from_file(&store, file)?;

    println!(
        "{} Restored {} key(s) from {}",
        "✓".green().bold(),
        result.restored_keys.len(),
        file.display()
    );
    if !result.skipped_dates.is_empty() {
        println!(
            "  Skipped {} date(s) deleted locally after the backup: {}",
            result.skipped_dates.len(),
            result.skipped_dates.join(", ")
        );
    }

    Ok(())
}

/// Show the paths being used.
fn cmd_paths(config: &AppConfig) -> domain::Result<()> {
    let target = build_target(config)?;

    println!("{}", "Memo Sync Paths".bold());
    println!();
    println!("  data dir:   {}", config.data_dir().display());
    println!("  store:      {}", config.store_db_path().display());
    println!("  config:     {}", config.config_file_path().display());
    println!("  target:     {}", target.describe());

    Ok(())
}

/// Manage the background systemd service.
fn cmd_service(config: &AppConfig, action: &ServiceAction) -> domain::Result<()> {
    let service = SystemdService::new(config.clone());

    match action {
        ServiceAction::Install => {
            let result = service.install()?;
            service.enable_and_start()?;
            println!(
                "{} Service installed at {}",
                "✓".green().bold(),
                result.service_path.display()
            );
        }
        ServiceAction::Uninstall => {
            service.uninstall()?;
            println!("{} Service uninstalled", "✓".yellow().bold());
        }
        ServiceAction::Status => {
            let status = service.get_status()?;
            println!("Service: {}", status.short_status().bold());
            if !status.status_text.is_empty() {
                println!();
                println!("{}", status.status_text);
            }
        }
        ServiceAction::Logs { lines } => {
            print!("{}", service.view_logs(*lines)?);
        }
    }

    Ok(())
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
