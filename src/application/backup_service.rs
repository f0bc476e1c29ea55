//! Backup payload construction and upload execution.
//!
//! Builds the JSON document uploaded to the backup target, names backup
//! files, and runs a single upload attempt with the fixed-delay retry
//! policy. The coordinator and the one-shot CLI sync path both go through
//! `execute_upload`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use tracing::{debug, info};

use crate::application::change_detector;
use crate::application::status::StatusSink;
use crate::domain::{
    AppError, BackupPayload, ChangeReason, Result, SyncError, SyncTuning, UploadError,
};
use crate::infrastructure::memo_store::MemoStore;

/// File name prefix used when no custom prefix is configured.
pub const DEFAULT_FILE_PREFIX: &str = "calendar-memos";

/// Destination for backup uploads.
#[async_trait]
pub trait BackupTarget: Send + Sync {
    /// Cheap connectivity probe, checked before every attempt.
    async fn is_connected(&self) -> bool;

    /// Upload a named backup document.
    async fn upload(&self, file_name: &str, body: &str) -> std::result::Result<(), UploadError>;

    /// Human-readable description for status output.
    fn describe(&self) -> String;
}

/// The configured file name prefix, falling back to the default.
pub fn effective_prefix(store: &Arc<MemoStore>) -> Result<String> {
    let custom = store.custom_file_name()?;
    if custom.is_empty() {
        Ok(DEFAULT_FILE_PREFIX.to_string())
    } else {
        Ok(custom)
    }
}

/// Backup file name: `<prefix>-<label>-<YYYY-MM-DD>-<HHMMSS>.json`, local time.
#[must_use]
pub fn sync_file_name(prefix: &str, reason: ChangeReason, at: DateTime<Local>) -> String {
    format!(
        "{prefix}-{}-{}.json",
        reason.label(),
        at.format("%Y-%m-%d-%H%M%S")
    )
}

/// A built backup document along with the content hash it represents.
pub struct PreparedBackup {
    /// Serialized payload body.
    pub body: String,
    /// Hash of the watched data the payload was built from.
    pub content_hash: String,
}

/// Build the upload payload from the watched entries.
///
/// Entry values that parse as JSON are embedded structurally; everything
/// else is carried as a raw string.
pub fn build_payload(store: &Arc<MemoStore>) -> Result<PreparedBackup> {
    let content_hash = change_detector::current_hash(store)?;

    let mut data = std::collections::BTreeMap::new();
    for (key, value) in store.watched_entries()? {
        let json = serde_json::from_str(&value)
            .unwrap_or_else(|_| serde_json::Value::String(value.clone()));
        data.insert(key, json);
    }

    let payload = BackupPayload {
        version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at: Utc::now(),
        device_id: store.device_id()?,
        data,
    };

    let body = serde_json::to_string_pretty(&payload).map_err(AppError::json_parse)?;

    Ok(PreparedBackup { body, content_hash })
}

/// Run one upload attempt against the target, retrying per policy.
///
/// Retryable failures (network, timeout, 5xx) are retried after a fixed
/// delay up to `max_retries` times; the first non-retryable failure and an
/// exhausted budget are terminal. At most `max_retries + 1` uploads happen.
pub async fn execute_upload(
    target: &Arc<dyn BackupTarget>,
    sink: &Arc<dyn StatusSink>,
    tuning: &SyncTuning,
    file_name: &str,
    body: &str,
) -> std::result::Result<(), SyncError> {
    if !target.is_connected().await {
        return Err(SyncError::NotConnected);
    }

    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(file_name, attempt, "uploading backup");

        match target.upload(file_name, body).await {
            Ok(()) => {
                info!(file_name, attempt, "backup uploaded");
                return Ok(());
            }
            Err(err) if err.is_retryable() && attempt <= tuning.max_retries => {
                sink.report(
                    crate::domain::SyncPhase::Retrying,
                    &format!("retrying sync (attempt {})", attempt + 1),
                    Some(&err.to_string()),
                );
                tokio::time::sleep(tuning.retry_delay()).await;
            }
            Err(err) if err.is_retryable() => {
                return Err(SyncError::RetriesExhausted {
                    attempts: attempt,
                    source: err,
                });
            }
            Err(err) => return Err(SyncError::Upload(err)),
        }
    }
}

/// Outcome of a one-shot sync.
#[derive(Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Content already matched the last synced hash.
    AlreadySynced,
    /// A backup was uploaded under the given file name.
    Synced { file_name: String },
}

/// Perform a single sync now, outside the coordinator.
///
/// Used by the `sync` CLI command. Skips the enabled check (the user asked
/// explicitly) but still skips when the content hash is unchanged.
pub async fn sync_once(
    store: &Arc<MemoStore>,
    target: &Arc<dyn BackupTarget>,
    sink: &Arc<dyn StatusSink>,
    tuning: &SyncTuning,
) -> std::result::Result<SyncOutcome, SyncError> {
    let state = store
        .load_sync_state()
        .map_err(|e| SyncError::Prepare(e.to_string()))?;
    let prepared = build_payload(store).map_err(|e| SyncError::Prepare(e.to_string()))?;

    if state.already_synced(&prepared.content_hash) {
        return Ok(SyncOutcome::AlreadySynced);
    }

    let prefix = effective_prefix(store).map_err(|e| SyncError::Prepare(e.to_string()))?;
    let file_name = sync_file_name(&prefix, ChangeReason::Manual, Local::now());

    sink.report(
        crate::domain::SyncPhase::Syncing,
        "syncing",
        Some(&file_name),
    );
    execute_upload(target, sink, tuning, &file_name, &prepared.body).await?;

    store
        .commit_sync_success(&prepared.content_hash, Utc::now())
        .map_err(|e| SyncError::Prepare(e.to_string()))?;
    sink.report(crate::domain::SyncPhase::Synced, "sync complete", None);

    Ok(SyncOutcome::Synced { file_name })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_file_name_format() {
        let at = Local.with_ymd_and_hms(2025, 8, 25, 14, 30, 5).unwrap();
        assert_eq!(
            sync_file_name("calendar-memos", ChangeReason::Modified, at),
            "calendar-memos-modified-2025-08-25-143005.json"
        );
        assert_eq!(
            sync_file_name("work", ChangeReason::Periodic, at),
            "work-other-2025-08-25-143005.json"
        );
    }

    #[test]
    fn test_effective_prefix_falls_back() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        assert_eq!(effective_prefix(&store).unwrap(), DEFAULT_FILE_PREFIX);

        store.set_custom_file_name("vacation-plan").unwrap();
        assert_eq!(effective_prefix(&store).unwrap(), "vacation-plan");

        store.set_custom_file_name("").unwrap();
        assert_eq!(effective_prefix(&store).unwrap(), DEFAULT_FILE_PREFIX);
    }

    #[test]
    fn test_build_payload_embeds_json_values() {
        let store = Arc::new(MemoStore::open_in_memory().unwrap());
        store.add_memo("2025-08-25", "dentist").unwrap();
        store.set("memos_archive", "plain text").unwrap();

        let prepared = build_payload(&store).unwrap();
        let parsed: BackupPayload = serde_json::from_str(&prepared.body).unwrap();

        assert!(parsed.data["calendarMemos"].is_object());
        assert_eq!(parsed.data["memos_archive"], "plain text");
        assert!(parsed.device_id.starts_with("device_"));
        assert_eq!(
            prepared.content_hash,
            change_detector::current_hash(&store).unwrap()
        );
    }
}
