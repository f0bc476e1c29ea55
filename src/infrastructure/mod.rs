//! Infrastructure layer - store, backup targets, and system integration.

pub mod config;
pub mod drive;
pub mod memo_store;
pub mod systemd;
pub mod watcher;

pub use config::{ensure_config_exists, load_config, load_config_from_file};
pub use drive::build_target;
pub use memo_store::MemoStore;
pub use systemd::SystemdService;
pub use watcher::watch_store_file;
