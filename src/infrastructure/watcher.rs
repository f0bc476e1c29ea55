//! Store file watching.
//!
//! Another process (or a second instance) may write the memo store while the
//! daemon runs. Watching the database files turns those writes into change
//! notifications for the coordinator. Self-inflicted events are harmless:
//! the coordinator hashes the watched data and drops anything already
//! synced.

use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::domain::{AppError, Result};

/// Keeps the underlying filesystem watcher alive.
pub struct StoreWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch the store database for external writes.
///
/// The callback runs on the watcher's thread whenever the database file (or
/// its WAL sidecars) is created or modified.
///
/// # Errors
/// Returns error if the watcher cannot be started.
pub fn watch_store_file(
    db_path: &Path,
    on_change: impl Fn() + Send + 'static,
) -> Result<StoreWatcher> {
    let Some(file_name) = db_path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Err(AppError::Config {
            message: format!("Invalid store path: {}", db_path.display()),
        });
    };
    let dir = db_path
        .parent()
        .map_or_else(|| Path::new(".").to_path_buf(), Path::to_path_buf);

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                return;
            }
            // WAL mode writes land in `<db>-wal` before the main file
            let relevant = event.paths.iter().any(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(file_name.as_str()))
                    .unwrap_or(false)
            });
            if relevant {
                debug!(?event.kind, "store file changed on disk");
                on_change();
            }
        }
        Err(err) => warn!(error = %err, "store watcher error"),
    })
    .map_err(|e| AppError::Config {
        message: format!("Failed to create store watcher: {e}"),
    })?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(|e| AppError::Config {
            message: format!("Failed to watch {}: {e}", dir.display()),
        })?;

    Ok(StoreWatcher { _watcher: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_watcher_fires_on_db_write() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("memos.db");
        std::fs::write(&db_path, b"initial").unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = watch_store_file(&db_path, move || {
            let _ = tx.send(());
        })
        .unwrap();

        std::fs::write(&db_path, b"changed").unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("memos.db");
        std::fs::write(&db_path, b"initial").unwrap();

        let (tx, rx) = mpsc::channel();
        let _watcher = watch_store_file(&db_path, move || {
            let _ = tx.send(());
        })
        .unwrap();

        std::fs::write(dir.path().join("other.txt"), b"noise").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
    }
}
