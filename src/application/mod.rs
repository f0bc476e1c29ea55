//! Application layer - sync coordination and backup services.

pub mod backup_service;
pub mod change_detector;
pub mod coordinator;
pub mod restore_service;
pub mod status;

pub use coordinator::SyncCoordinator;
pub use status::{LogSink, StatusSink};
