use std::path::PathBuf;
use thiserror::Error;

/// Errors returned synchronously by orchestrator operations.
///
/// Failures of an individual directory sync are not reported through this type;
/// they are classified into [`crate::SyncErrorKind`] and recorded on the
/// directory's [`crate::SyncState`].
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Directory not registered: {}", .0.display())]
    UnknownDirectory(PathBuf),

    #[error("Invalid directory path: {0}")]
    InvalidPath(String),

    #[error("Invalid exclude pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Directory is currently syncing: {}", .0.display())]
    DirectoryBusy(PathBuf),

    #[error("Failed to start background task: {0}")]
    WorkerStartup(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
