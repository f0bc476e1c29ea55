//! Status reporting seam.
//!
//! The coordinator reports each executor state transition through a
//! `StatusSink`. The default sink logs via `tracing`; tests install a
//! recording sink instead.

use tracing::{error, info, warn};

use crate::domain::SyncPhase;

/// Observer of sync status transitions.
pub trait StatusSink: Send + Sync {
    /// Report a phase transition with a short message and optional detail.
    fn report(&self, phase: SyncPhase, message: &str, detail: Option<&str>);
}

/// Sink that forwards status transitions to the log.
pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, phase: SyncPhase, message: &str, detail: Option<&str>) {
        match phase {
            SyncPhase::Syncing | SyncPhase::Synced => {
                info!(phase = phase.as_str(), detail, "{message}");
            }
            SyncPhase::Retrying => {
                warn!(phase = phase.as_str(), detail, "{message}");
            }
            SyncPhase::Error => {
                error!(phase = phase.as_str(), detail, "{message}");
            }
        }
    }
}
