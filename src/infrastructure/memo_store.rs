//! SQLite-backed key-value store for calendar memo data.
//!
//! Owns the persisted surface the sync subsystem watches: memo entries under
//! `calendarMemos` (and any `memos_`-prefixed key), deletion tombstones, and
//! the string-valued sync settings. Writes to watched keys synchronously
//! notify subscribed observers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::mpsc;

use crate::domain::{AppError, ChangeEvent, ChangeReason, Result, SyncState};

/// The primary watched key holding the memo map.
pub const WATCHED_KEY: &str = "calendarMemos";

/// Prefix of additional watched keys.
pub const WATCHED_PREFIX: &str = "memos_";

/// Settings keys (string-valued entries on the same store).
const KEY_AUTO_SYNC_ENABLED: &str = "autoSyncEnabled";
const KEY_SYNC_INTERVAL: &str = "syncInterval";
const KEY_LAST_SYNC_TIME: &str = "lastSyncTime";
const KEY_LAST_SYNCED_HASH: &str = "lastSyncedHash";
const KEY_CUSTOM_FILE_NAME: &str = "customFileName";
const KEY_DEVICE_ID: &str = "deviceId";

/// Default periodic sync interval in milliseconds (5 minutes).
pub const DEFAULT_SYNC_INTERVAL_MS: u64 = 300_000;

/// Whether a key belongs to the watched memo surface.
#[must_use]
pub fn is_watched_key(key: &str) -> bool {
    key == WATCHED_KEY || key.starts_with(WATCHED_PREFIX)
}

/// Persistent memo store with change notification.
pub struct MemoStore {
    conn: Mutex<Connection>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl MemoStore {
    /// Opens or creates the memo store database.
    ///
    /// # Errors
    /// Returns error if the database cannot be opened or schema creation fails.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create store directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::store)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::store)?;

        let store = Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(Vec::new()),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Opens an in-memory store (used in tests).
    ///
    /// # Errors
    /// Returns error if schema creation fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::store)?;
        let store = Self {
            conn: Mutex::new(conn),
            watchers: Mutex::new(Vec::new()),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn()
            .execute_batch(
                r"
            -- Key-value entries (memo data plus string-valued settings)
            CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Deletion markers for memo date keys
            CREATE TABLE IF NOT EXISTS tombstones (
                memo_date TEXT PRIMARY KEY,
                deleted_at TEXT NOT NULL
            );
            ",
            )
            .map_err(AppError::store)?;

        Ok(())
    }

    /// Subscribe to change events for watched keys.
    ///
    /// Events are published synchronously from `set`/`remove`/`clear_watched`
    /// when the stored value actually changed.
    pub fn watch(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn publish(&self, event: ChangeEvent) {
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Get the value of a key.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn()
            .query_row("SELECT value FROM entries WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
            .map_err(AppError::store)
    }

    /// Set the value of a key, notifying observers if a watched key changed.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let old = self.get(key)?;

        self.conn()
            .execute(
                r"
            INSERT INTO entries (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            ",
                params![key, value],
            )
            .map_err(AppError::store)?;

        if is_watched_key(key) && old.as_deref() != Some(value) {
            self.publish(ChangeEvent::new(ChangeReason::Modified, Some(key.into())));
        }

        Ok(())
    }

    /// Remove a key, notifying observers if a watched key existed.
    pub fn remove(&self, key: &str) -> Result<()> {
        let old = self.get(key)?;

        self.conn()
            .execute("DELETE FROM entries WHERE key = ?1", [key])
            .map_err(AppError::store)?;

        if is_watched_key(key) && old.is_some() {
            self.publish(ChangeEvent::new(ChangeReason::Removed, Some(key.into())));
        }

        Ok(())
    }

    /// Delete all watched keys, recording tombstones for their memo dates.
    ///
    /// Returns the number of keys removed.
    pub fn clear_watched(&self) -> Result<usize> {
        // Tombstone every memo date so a later restore cannot resurrect them
        let dates: Vec<String> = self.memos()?.into_keys().collect();
        let now = Utc::now();
        for date in &dates {
            self.record_tombstone(date, now)?;
        }

        let removed = self
            .conn()
            .execute(
                "DELETE FROM entries WHERE key = ?1 OR key LIKE ?2",
                params![WATCHED_KEY, format!("{WATCHED_PREFIX}%")],
            )
            .map_err(AppError::store)?;

        if removed > 0 {
            self.publish(ChangeEvent::new(ChangeReason::Cleared, None));
        }

        Ok(removed)
    }

    /// All watched entries, for backup payload construction.
    pub fn watched_entries(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key, value FROM entries WHERE key = ?1 OR key LIKE ?2 ORDER BY key")
            .map_err(AppError::store)?;

        let rows = stmt
            .query_map(
                params![WATCHED_KEY, format!("{WATCHED_PREFIX}%")],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(AppError::store)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(AppError::store)?);
        }

        Ok(entries)
    }

    // --- Memo convenience layer -------------------------------------------

    /// Parse the memo map stored under the watched key.
    pub fn memos(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let raw = self.get(WATCHED_KEY)?.unwrap_or_else(|| "{}".into());
        serde_json::from_str(&raw).map_err(AppError::json_parse)
    }

    fn write_memos(&self, memos: &BTreeMap<String, Vec<String>>) -> Result<()> {
        let raw = serde_json::to_string(memos).map_err(AppError::json_parse)?;
        self.set(WATCHED_KEY, &raw)
    }

    /// Append a memo under a date key (`YYYY-MM-DD`).
    pub fn add_memo(&self, date: &str, text: &str) -> Result<()> {
        let mut memos = self.memos()?;
        memos.entry(date.to_string()).or_default().push(text.into());
        self.write_memos(&memos)
    }

    /// Remove all memos for a date, recording a tombstone.
    ///
    /// Returns the number of memos removed.
    pub fn remove_memos(&self, date: &str) -> Result<usize> {
        let mut memos = self.memos()?;
        let removed = memos.remove(date).map_or(0, |m| m.len());

        if removed > 0 {
            self.record_tombstone(date, Utc::now())?;
            self.write_memos(&memos)?;
        }

        Ok(removed)
    }

    // --- Tombstones --------------------------------------------------------

    /// Record that the memos under a date were deliberately deleted.
    pub fn record_tombstone(&self, date: &str, deleted_at: DateTime<Utc>) -> Result<()> {
        self.conn()
            .execute(
                r"
            INSERT INTO tombstones (memo_date, deleted_at)
            VALUES (?1, ?2)
            ON CONFLICT(memo_date) DO UPDATE SET deleted_at = excluded.deleted_at
            ",
                params![date, deleted_at.to_rfc3339()],
            )
            .map_err(AppError::store)?;

        Ok(())
    }

    /// When the memos under a date were deleted, if ever.
    pub fn tombstone_deleted_at(&self, date: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT deleted_at FROM tombstones WHERE memo_date = ?1",
                [date],
                |row| row.get(0),
            )
            .optional()
            .map_err(AppError::store)?;

        Ok(raw
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }

    // --- Sync settings surface ---------------------------------------------

    /// Whether auto-sync is enabled (`autoSyncEnabled`, default true).
    pub fn auto_sync_enabled(&self) -> Result<bool> {
        Ok(self
            .get(KEY_AUTO_SYNC_ENABLED)?
            .map_or(true, |v| v != "false"))
    }

    /// Persist the auto-sync enabled flag.
    pub fn set_auto_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.set(KEY_AUTO_SYNC_ENABLED, if enabled { "true" } else { "false" })
    }

    /// Periodic sync interval in milliseconds (`syncInterval`).
    pub fn sync_interval_ms(&self) -> Result<u64> {
        Ok(self
            .get(KEY_SYNC_INTERVAL)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SYNC_INTERVAL_MS))
    }

    /// Persist the periodic sync interval.
    pub fn set_sync_interval_ms(&self, interval_ms: u64) -> Result<()> {
        self.set(KEY_SYNC_INTERVAL, &interval_ms.to_string())
    }

    /// When the last successful sync completed (`lastSyncTime`, epoch ms).
    pub fn last_sync_time(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get(KEY_LAST_SYNC_TIME)?
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis))
    }

    /// Content hash of the watched data at last successful sync.
    pub fn last_synced_hash(&self) -> Result<Option<String>> {
        self.get(KEY_LAST_SYNCED_HASH)
    }

    /// User-configured backup file name prefix (`customFileName`).
    pub fn custom_file_name(&self) -> Result<String> {
        Ok(self.get(KEY_CUSTOM_FILE_NAME)?.unwrap_or_default())
    }

    /// Persist the backup file name prefix. An empty value clears it.
    pub fn set_custom_file_name(&self, name: &str) -> Result<()> {
        self.set(KEY_CUSTOM_FILE_NAME, name.trim())
    }

    /// Stable device identifier, generated and persisted on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.get(KEY_DEVICE_ID)? {
            return Ok(id);
        }

        let id = format!(
            "device_{:x}_{}",
            std::process::id(),
            Utc::now().timestamp_millis()
        );
        self.set(KEY_DEVICE_ID, &id)?;
        Ok(id)
    }

    /// Load the persisted sync state.
    pub fn load_sync_state(&self) -> Result<SyncState> {
        Ok(SyncState {
            enabled: self.auto_sync_enabled()?,
            interval_ms: self.sync_interval_ms()?,
            last_sync_at: self.last_sync_time()?,
            last_synced_hash: self.last_synced_hash()?,
        })
    }

    /// Commit a successful sync: `lastSyncedHash` and `lastSyncTime` are
    /// written in one transaction so no reader observes one without the other.
    pub fn commit_sync_success(&self, hash: &str, at: DateTime<Utc>) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().map_err(AppError::store)?;

        for (key, value) in [
            (KEY_LAST_SYNCED_HASH, hash.to_string()),
            (KEY_LAST_SYNC_TIME, at.timestamp_millis().to_string()),
        ] {
            tx.execute(
                r"
            INSERT INTO entries (key, value, updated_at)
            VALUES (?1, ?2, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            ",
                params![key, value],
            )
            .map_err(AppError::store)?;
        }

        tx.commit().map_err(AppError::store)
    }
}
