//! Application configuration.
//!
//! The TOML config file carries installation-level settings: sync tuning,
//! the backup target, and path overrides. Runtime-changeable settings
//! (enabled flag, interval, file name prefix) live in the memo store instead,
//! so they survive reloads and are shared with other processes.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing and retry tuning for the sync coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTuning {
    /// Quiet period after a change before a sync attempt, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Cooldown before a follow-up attempt for a pending change, in milliseconds.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Maximum number of retries of a single attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            cooldown_ms: default_cooldown_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl SyncTuning {
    /// Debounce quiet period as a `Duration`.
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Follow-up cooldown as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Retry delay as a `Duration`.
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

const fn default_debounce_ms() -> u64 {
    3000
}

const fn default_cooldown_ms() -> u64 {
    3000
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_delay_ms() -> u64 {
    2000
}

/// Kind of backup target to upload to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A local directory (e.g. a mounted cloud-drive folder).
    #[default]
    Directory,
    /// An HTTP endpoint accepting PUT uploads.
    Http,
}

/// Backup target configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Which adapter to use.
    #[serde(default)]
    pub kind: TargetKind,

    /// Directory path (directory target). Defaults to `<data_dir>/drive`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Base URL (http target).
    #[serde(default)]
    pub url: Option<String>,

    /// Basic auth username (http target).
    #[serde(default)]
    pub username: Option<String>,

    /// Basic auth password (http target).
    #[serde(default)]
    pub password: Option<String>,
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sync coordinator tuning.
    #[serde(default)]
    pub sync: SyncTuning,

    /// Backup target selection.
    #[serde(default)]
    pub target: TargetConfig,

    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".memo-sync")
    }

    /// Get the memo store database path.
    #[must_use]
    pub fn store_db_path(&self) -> PathBuf {
        self.data_dir().join("memos.db")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }

    /// Directory used by the default directory target.
    #[must_use]
    pub fn default_target_dir(&self) -> PathBuf {
        self.data_dir().join("drive")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning() {
        let config = AppConfig::default();
        assert_eq!(config.sync.debounce_ms, 3000);
        assert_eq!(config.sync.cooldown_ms, 3000);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.sync.retry_delay_ms, 2000);
    }

    #[test]
    fn test_default_target_is_directory() {
        let config = AppConfig::default();
        assert_eq!(config.target.kind, TargetKind::Directory);
        assert!(config.target.path.is_none());
    }

    #[test]
    fn test_data_dir_override() {
        let config = AppConfig {
            paths: PathConfig {
                data_dir: Some(PathBuf::from("/tmp/memo-sync-test")),
            },
            ..Default::default()
        };
        assert_eq!(
            config.store_db_path(),
            PathBuf::from("/tmp/memo-sync-test/memos.db")
        );
    }
}
