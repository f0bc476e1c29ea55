//! Domain models for the sync subsystem.
//!
//! These types describe observed changes, the coalesced pending change that
//! survives an in-flight sync, and the persisted sync state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a sync attempt was proposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    /// A watched key was written with new content.
    Modified,
    /// A watched key was removed.
    Removed,
    /// All watched keys were cleared.
    Cleared,
    /// User-requested sync.
    Manual,
    /// Wall-clock periodic trigger.
    Periodic,
    /// Auto-sync was just turned on.
    Enabled,
}

impl ChangeReason {
    /// Short label used in generated backup file names.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Cleared => "cleared",
            Self::Manual => "manual",
            Self::Periodic | Self::Enabled => "other",
        }
    }
}

impl std::fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Modified => write!(f, "modified"),
            Self::Removed => write!(f, "removed"),
            Self::Cleared => write!(f, "cleared"),
            Self::Manual => write!(f, "manual"),
            Self::Periodic => write!(f, "periodic"),
            Self::Enabled => write!(f, "enabled"),
        }
    }
}

/// A single observed mutation of a watched key.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// What kind of mutation happened.
    pub reason: ChangeReason,
    /// The mutated key, if the mutation was key-specific.
    pub key: Option<String>,
    /// When the mutation was observed.
    pub observed_at: DateTime<Utc>,
}

impl ChangeEvent {
    /// Create an event observed now.
    #[must_use]
    pub fn new(reason: ChangeReason, key: Option<String>) -> Self {
        Self {
            reason,
            key,
            observed_at: Utc::now(),
        }
    }
}

/// A change observed while a sync was in flight.
///
/// At most one exists at a time; newer changes overwrite it (latest wins).
#[derive(Debug, Clone)]
pub struct PendingChange {
    /// Reason of the most recent change.
    pub reason: ChangeReason,
    /// Key of the most recent change, if any.
    pub key: Option<String>,
    /// Content hash at the time of the change.
    pub content_hash: String,
    /// When the change was observed.
    pub observed_at: DateTime<Utc>,
}

/// Persisted state of the sync subsystem.
///
/// Loaded from the store at startup; `last_synced_hash` and `last_sync_at`
/// are mutated only on confirmed sync success, together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    /// Whether periodic/triggered sync is active.
    pub enabled: bool,

    /// Desired period between periodic sync attempts, in milliseconds.
    pub interval_ms: u64,

    /// When the last successful sync completed.
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Content hash of the watched data at last successful sync.
    pub last_synced_hash: Option<String>,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 300_000,
            last_sync_at: None,
            last_synced_hash: None,
        }
    }
}

impl SyncState {
    /// Whether the given hash matches the last synced one.
    #[must_use]
    pub fn already_synced(&self, hash: &str) -> bool {
        self.last_synced_hash.as_deref() == Some(hash)
    }
}

/// Status sink phases, reported at each executor state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// An attempt started.
    Syncing,
    /// A retry of the current attempt is scheduled.
    Retrying,
    /// The attempt succeeded.
    Synced,
    /// The attempt failed terminally.
    Error,
}

impl SyncPhase {
    /// Stable lowercase name for logs and UI hooks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Syncing => "syncing",
            Self::Retrying => "retrying",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

/// The JSON document uploaded to the backup target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupPayload {
    /// Version of the tool that produced the backup.
    pub version: String,
    /// When the backup was generated.
    pub generated_at: DateTime<Utc>,
    /// Stable identifier of the producing device.
    pub device_id: String,
    /// Watched entries, keyed by store key. Values that parse as JSON are
    /// embedded structurally; everything else is kept as a raw string.
    pub data: BTreeMap<String, serde_json::Value>,
}
