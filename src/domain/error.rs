//! Domain-level error types for memo-sync.
//!
//! All errors are typed with `thiserror`. `AppError` covers local failures
//! (store, config, IO); `SyncError` is the taxonomy surfaced by the sync
//! executor; `UploadError` is the structured error contract of the backup
//! target collaborator.

use thiserror::Error;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Failed to open or query the memo store.
    #[error("Store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A sync attempt failed.
    #[error("{0}")]
    Sync(#[from] SyncError),
}

impl AppError {
    /// Create a store error from a rusqlite error.
    pub fn store(err: rusqlite::Error) -> Self {
        Self::Store {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Structured error contract of the upload collaborator.
///
/// Retryability is decided from the variant, not from message text.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Connection-level failure (DNS, refused, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The request timed out.
    #[error("request timed out")]
    Timeout,

    /// The target answered with a 5xx status.
    #[error("server error: HTTP {0}")]
    Server(u16),

    /// The target rejected the request (4xx), e.g. bad auth or bad payload.
    #[error("rejected by target: HTTP {0}")]
    Rejected(u16),

    /// Local IO failure while writing to the target.
    #[error("target IO error: {0}")]
    Io(String),

    /// Anything else; treated as terminal.
    #[error("{0}")]
    Other(String),
}

impl UploadError {
    /// Whether a retry of the same attempt may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout | Self::Server(_))
    }
}

/// Outcome taxonomy of a sync attempt.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connectivity probe false or collaborator unreachable before upload.
    #[error("backup target not connected")]
    NotConnected,

    /// Retry budget spent on a retryable error.
    #[error("sync failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: UploadError,
    },

    /// Terminal upload error, not retried.
    #[error("sync failed: {0}")]
    Upload(#[from] UploadError),

    /// Local failure preparing the attempt (store read, serialization).
    #[error("sync failed: {0}")]
    Prepare(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(UploadError::Network("reset".into()).is_retryable());
        assert!(UploadError::Timeout.is_retryable());
        assert!(UploadError::Server(503).is_retryable());
        assert!(!UploadError::Rejected(401).is_retryable());
        assert!(!UploadError::Io("disk full".into()).is_retryable());
        assert!(!UploadError::Other("bad payload".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_message_carries_attempt_count() {
        let err = SyncError::RetriesExhausted {
            attempts: 4,
            source: UploadError::Server(502),
        };
        assert!(err.to_string().contains("4 attempts"));
    }
}
