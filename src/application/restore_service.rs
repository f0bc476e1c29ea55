//! Restore memo data from a backup document.
//!
//! Restoring replaces the watched entries with the backup's contents, except
//! that memo dates deleted locally *after* the backup was generated stay
//! deleted: the tombstone wins when it is newer than the backup.
//!
//! Writing the watched key notifies store observers, so a running
//! coordinator will sync the restored state like any other change.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::{AppError, BackupPayload, Result};
use crate::infrastructure::memo_store::{is_watched_key, MemoStore, WATCHED_KEY};

/// Outcome of a restore.
#[derive(Debug, Default)]
pub struct RestoreResult {
    /// Store keys that were written.
    pub restored_keys: Vec<String>,
    /// Memo dates skipped because a newer local deletion exists.
    pub skipped_dates: Vec<String>,
}

/// Restore from a backup file on disk.
pub fn restore_from_file(store: &Arc<MemoStore>, path: &Path) -> Result<RestoreResult> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read backup file: {}", path.display()), e))?;
    restore_from_str(store, &raw)
}

/// Restore from a serialized backup document.
pub fn restore_from_str(store: &Arc<MemoStore>, raw: &str) -> Result<RestoreResult> {
    let payload: BackupPayload = serde_json::from_str(raw).map_err(AppError::json_parse)?;

    info!(
        device_id = %payload.device_id,
        generated_at = %payload.generated_at,
        keys = payload.data.len(),
        "restoring backup"
    );

    let mut result = RestoreResult::default();

    for (key, value) in &payload.data {
        if !is_watched_key(key) {
            debug!(key, "skipping non-memo key in backup");
            continue;
        }

        if key == WATCHED_KEY {
            let restored = restore_memo_map(store, value, &payload, &mut result)?;
            if restored {
                result.restored_keys.push(key.clone());
            }
            continue;
        }

        let raw_value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => serde_json::to_string(other).map_err(AppError::json_parse)?,
        };
        store.set(key, &raw_value)?;
        result.restored_keys.push(key.clone());
    }

    Ok(result)
}

/// Write the memo map from the backup, dropping tombstoned dates.
fn restore_memo_map(
    store: &Arc<MemoStore>,
    value: &serde_json::Value,
    payload: &BackupPayload,
    result: &mut RestoreResult,
) -> Result<bool> {
    let Some(map) = value.as_object() else {
        debug!("memo map in backup is not an object, skipping");
        return Ok(false);
    };

    let mut filtered: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for (date, memos) in map {
        match store.tombstone_deleted_at(date)? {
            Some(deleted_at) if deleted_at > payload.generated_at => {
                debug!(date, %deleted_at, "local deletion is newer than backup, keeping deleted");
                result.skipped_dates.push(date.clone());
            }
            _ => {
                filtered.insert(date.clone(), memos.clone());
            }
        }
    }

    let raw = serde_json::to_string(&filtered).map_err(AppError::json_parse)?;
    store.set(WATCHED_KEY, &raw)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn backup_with_memos(generated_at: chrono::DateTime<Utc>, memos: serde_json::Value) -> String {
        serde_json::to_string(&serde_json::json!({
            "version": "0.1.0",
            "generatedAt": generated_at,
            "deviceId": "device_test",
            "data": { "calendarMemos": memos }
        }))
        .unwrap()
    }

    #[test]
    fn test_restore_replaces_memo_map() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        store.add_memo("2025-01-01", "old local memo").unwrap();

        let raw = backup_with_memos(
            Utc::now(),
            serde_json::json!({ "2025-08-25": ["from backup"] }),
        );
        let result = restore_from_str(&store, &raw).unwrap();

        assert_eq!(result.restored_keys, vec!["calendarMemos"]);
        let memos = store.memos().unwrap();
        assert_eq!(memos.len(), 1);
        assert_eq!(memos["2025-08-25"], vec!["from backup"]);
    }

    #[test]
    fn test_newer_local_deletion_wins() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());

        // Backup generated an hour ago, memo deleted locally just now
        let generated_at = Utc::now() - Duration::hours(1);
        store.record_tombstone("2025-08-20", Utc::now()).unwrap();

        let raw = backup_with_memos(
            generated_at,
            serde_json::json!({
                "2025-08-20": ["deleted locally"],
                "2025-08-25": ["kept"]
            }),
        );
        let result = restore_from_str(&store, &raw).unwrap();

        assert_eq!(result.skipped_dates, vec!["2025-08-20"]);
        let memos = store.memos().unwrap();
        assert!(!memos.contains_key("2025-08-20"));
        assert_eq!(memos["2025-08-25"], vec!["kept"]);
    }

    #[test]
    fn test_older_deletion_is_overridden() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());

        // Memo deleted before the backup was generated: the backup wins
        store
            .record_tombstone("2025-08-20", Utc::now() - Duration::hours(2))
            .unwrap();

        let raw = backup_with_memos(
            Utc::now(),
            serde_json::json!({ "2025-08-20": ["re-added after deletion"] }),
        );
        let result = restore_from_str(&store, &raw).unwrap();

        assert!(result.skipped_dates.is_empty());
        assert_eq!(
            store.memos().unwrap()["2025-08-20"],
            vec!["re-added after deletion"]
        );
    }

    #[test]
    fn test_invalid_backup_is_rejected() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        assert!(restore_from_str(&store, "not json").is_err());
        assert!(restore_from_str(&store, "{\"wrong\": true}").is_err());
    }
}
