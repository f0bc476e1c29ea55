//! Configuration file management.
//!
//! Handles loading and saving TOML configuration files.

use std::fs;
use std::path::Path;

use crate::domain::{AppConfig, AppError, Result};

/// Default configuration file content.
const DEFAULT_CONFIG: &str = r#"# Memo Sync Configuration
# Auto-generated - edit as needed

[sync]
# Quiet period after a change before a sync attempt, in milliseconds
debounce_ms = 3000

# Cooldown before a follow-up sync for a change queued during an upload
cooldown_ms = 3000

# Maximum retries of a single sync attempt
max_retries = 3

# Fixed delay between retries, in milliseconds
retry_delay_ms = 2000

[target]
# Backup target kind: "directory" or "http"
kind = "directory"

# Directory target path (optional, defaults to ~/.memo-sync/drive)
# path = "/mnt/cloud-drive/memo-backups"

# HTTP target settings (used when kind = "http")
# url = "https://backups.example.com/memos"
# username = "user"
# password = "secret"

[paths]
# Custom data directory (optional, defaults to ~/.memo-sync)
# data_dir = "/custom/path"
"#;

/// Load configuration from file or create default.
///
/// # Errors
/// Returns error if file exists but cannot be read or parsed.
pub fn load_config() -> Result<AppConfig> {
    let config_path = AppConfig::default_data_dir().join("config.toml");

    if config_path.exists() {
        load_config_from_file(&config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file: {e}"),
    })
}

/// Save configuration to file.
///
/// # Errors
/// Returns error if file cannot be written.
pub fn save_config(config: &AppConfig) -> Result<()> {
    let config_path = config.config_file_path();

    // Ensure parent directory exists
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create config directory", e))?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| AppError::Config {
        message: format!("Failed to serialize config: {e}"),
    })?;

    fs::write(&config_path, content)
        .map_err(|e| AppError::io(format!("Failed to write config file: {}", config_path.display()), e))?;

    tracing::info!(path = %config_path.display(), "Configuration saved");

    Ok(())
}

/// Create default configuration file if it doesn't exist.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists() -> Result<()> {
    let config_path = AppConfig::default_data_dir().join("config.toml");

    if !config_path.exists() {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create config directory", e))?;
        }

        fs::write(&config_path, DEFAULT_CONFIG)
            .map_err(|e| AppError::io("Failed to create default config", e))?;

        tracing::info!(path = %config_path.display(), "Created default configuration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetKind;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: AppConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.sync.debounce_ms, 3000);
        assert_eq!(config.sync.max_retries, 3);
        assert_eq!(config.target.kind, TargetKind::Directory);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let config = AppConfig {
            paths: crate::domain::config::PathConfig {
                data_dir: Some(dir.path().to_path_buf()),
            },
            ..Default::default()
        };

        save_config(&config).unwrap();

        let loaded = load_config_from_file(&config.config_file_path()).unwrap();
        assert_eq!(loaded.sync.debounce_ms, config.sync.debounce_ms);
        assert_eq!(loaded.sync.retry_delay_ms, config.sync.retry_delay_ms);
        assert_eq!(loaded.data_dir(), config.data_dir());
    }

    #[test]
    fn test_http_target_parses() {
        let config: AppConfig = toml::from_str(
            r#"
            [target]
            kind = "http"
            url = "https://backups.example.com/memos"
            username = "user"
            "#,
        )
        .unwrap();
        assert_eq!(config.target.kind, TargetKind::Http);
        assert_eq!(
            config.target.url.as_deref(),
            Some("https://backups.example.com/memos")
        );
    }
}
