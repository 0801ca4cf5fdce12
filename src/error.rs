//! Error types for the sync pipeline

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while ingesting a single filesystem change.
///
/// None of these are fatal to the process: the engine logs them and drops
/// the event. The next change to the same file retries naturally.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed document {path:?}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store error: {0:#}")]
    Store(#[from] anyhow::Error),

    #[error("Invalid watch pattern: {0}")]
    Pattern(#[from] globset::Error),
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        SyncError::Json {
            path: path.into(),
            source,
        }
    }

    /// Transient errors self-heal on the next filesystem change
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Io { .. } | SyncError::Timeout(_))
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
