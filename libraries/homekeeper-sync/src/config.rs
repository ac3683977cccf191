/// Orchestrator configuration
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How directories get scheduled for sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// A timer enqueues every registered directory each interval
    Periodic,
    /// Directories sync only when explicitly triggered
    Manual,
}

/// Settings fixed for the lifetime of a [`crate::SyncOrchestrator`].
///
/// Changing any of these requires constructing a new orchestrator.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_mode")]
    pub mode: SyncMode,

    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,

    #[serde(default = "default_tool_path")]
    pub tool_path: PathBuf,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default = "default_resync_timeout_seconds")]
    pub resync_timeout_seconds: u64,

    #[serde(default = "default_stop_grace_seconds")]
    pub stop_grace_seconds: u64,

    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Local base directory; remote paths mirror paths relative to it
    #[serde(default)]
    pub local_root: Option<PathBuf>,

    /// Folder on the remote under which all directories are mirrored
    #[serde(default)]
    pub remote_root: Option<String>,

    /// Additional flags passed to every tool invocation
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl SyncConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.mode == SyncMode::Periodic && self.interval_seconds == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_seconds must be greater than zero in periodic mode".to_string(),
            ));
        }

        if self.workers == 0 {
            return Err(SyncError::InvalidConfig(
                "at least one worker is required".to_string(),
            ));
        }

        if self.timeout_seconds == 0 || self.resync_timeout_seconds == 0 {
            return Err(SyncError::InvalidConfig(
                "sync timeouts must be greater than zero".to_string(),
            ));
        }

        if self.tool_path.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig("tool_path is empty".to_string()));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    /// Time budget for a sync, depending on whether it rebuilds the tool's cache
    pub fn timeout_for(&self, force_resync: bool) -> Duration {
        if force_resync {
            Duration::from_secs(self.resync_timeout_seconds)
        } else {
            Duration::from_secs(self.timeout_seconds)
        }
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

// Default values
fn default_mode() -> SyncMode {
    SyncMode::Periodic
}

fn default_interval_seconds() -> u64 {
    300
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("rclone")
}

fn default_workers() -> usize {
    1
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_resync_timeout_seconds() -> u64 {
    600
}

fn default_stop_grace_seconds() -> u64 {
    10
}

fn default_history_size() -> usize {
    20
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            interval_seconds: default_interval_seconds(),
            tool_path: default_tool_path(),
            workers: default_workers(),
            timeout_seconds: default_timeout_seconds(),
            resync_timeout_seconds: default_resync_timeout_seconds(),
            stop_grace_seconds: default_stop_grace_seconds(),
            history_size: default_history_size(),
            local_root: None,
            remote_root: None,
            extra_args: Vec::new(),
        }
    }
}
