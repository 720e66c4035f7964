use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while capturing, encoding, or playing back.
///
/// Overflow of the pending queue and corrupt decoder reads are not errors:
/// they are counted and logged, and the pipeline keeps running.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("encoder executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("encoder failed to start: {0}")]
    StartFailed(String),

    #[error("pipe i/o failed: {0}")]
    Io(String),

    #[error("timeout")]
    Timeout,

    #[error("a capture session is already active")]
    AlreadyActive,

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("mux failed: {0}")]
    MuxFailed(String),
}

impl CaptureError {
    pub(crate) fn io(context: &str, err: std::io::Error) -> Self {
        Self::Io(format!("{}: {}", context, err))
    }

    pub(crate) fn storage(context: &str, err: std::io::Error) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }
}
