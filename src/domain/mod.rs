//! Domain layer - core types for the sync subsystem.
//!
//! This layer contains pure domain models, configuration, and error types
//! without any external dependencies (DB, IO, etc.).

pub mod config;
pub mod error;
pub mod models;

pub use config::{AppConfig, SyncTuning, TargetConfig, TargetKind};
pub use error::{AppError, Result, SyncError, UploadError};
pub use models::{BackupPayload, ChangeEvent, ChangeReason, PendingChange, SyncPhase, SyncState};
