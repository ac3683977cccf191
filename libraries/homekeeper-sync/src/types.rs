use crate::config::SyncMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Version of the [`OrchestratorStatus`] layout. Bumped whenever fields change meaning.
pub const STATUS_SCHEMA_VERSION: u32 = 1;

/// Sync status of a single registered directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Queued,
    Syncing,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Queued => "queued",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Classified failure of one invocation of the external sync tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Remote credentials are invalid or expired. Needs operator action.
    AuthError,
    /// Transient connectivity problem. Retried on the next scheduled tick.
    NetworkError,
    /// Both sides diverged; only an explicit resync resolves it.
    ConflictError,
    /// The executable is missing or cannot be run.
    ToolUnavailable,
    /// The sync exceeded its time budget and was killed.
    Timeout,
    /// The orchestrator stopped while the sync was running.
    Canceled,
    Unknown,
}

impl SyncErrorKind {
    /// Whether this kind reflects a problem with the directory or remote,
    /// as opposed to the daemon shutting down.
    pub fn is_health_problem(self) -> bool {
        !matches!(self, SyncErrorKind::Canceled)
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncErrorKind::AuthError => "authentication error",
            SyncErrorKind::NetworkError => "network error",
            SyncErrorKind::ConflictError => "conflict (resync required)",
            SyncErrorKind::ToolUnavailable => "sync tool unavailable",
            SyncErrorKind::Timeout => "timed out",
            SyncErrorKind::Canceled => "sync canceled",
            SyncErrorKind::Unknown => "sync failed",
        };
        f.write_str(s)
    }
}

/// A directory under management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    pub path: PathBuf,
    pub registered_at: DateTime<Utc>,
}

/// Per-directory sync state, as seen by status readers
///
/// `error_message` is `Some` exactly when `status` is [`SyncStatus::Error`].
/// `last_sync_time` only moves forward on a successful sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub status: SyncStatus,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub last_error_kind: Option<SyncErrorKind>,
    pub consecutive_failures: u32,
}

impl SyncState {
    pub fn is_syncing(&self) -> bool {
        self.status == SyncStatus::Syncing
    }
}

/// A pending request to sync one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueEntry {
    pub path: PathBuf,
    pub force_resync: bool,
    pub enqueued_at: DateTime<Utc>,
}

/// Result of an enqueue request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A new entry was added to the queue
    Queued,
    /// An equivalent entry was already waiting; nothing changed
    AlreadyPending,
    /// A waiting normal entry was upgraded to a forced resync
    Escalated,
}

/// Result of [`crate::SyncOrchestrator::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

/// How a recorded sync ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SyncRecordOutcome {
    Success,
    Failed { kind: SyncErrorKind, message: String },
}

/// One entry of a directory's in-memory sync history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub forced: bool,
    pub outcome: SyncRecordOutcome,
}

impl SyncRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, SyncRecordOutcome::Success)
    }
}

/// Aggregate orchestrator status, returned by [`crate::SyncOrchestrator::status`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub schema_version: u32,
    pub running: bool,
    pub remote_name: Option<String>,
    pub sync_mode: SyncMode,
    pub sync_interval_seconds: u64,
    pub directories: usize,
    pub queue_size: usize,
    pub sync_states: BTreeMap<PathBuf, SyncState>,
}

impl OrchestratorStatus {
    /// Number of directories currently in the error state
    pub fn failing_directories(&self) -> usize {
        self.sync_states
            .values()
            .filter(|s| s.status == SyncStatus::Error)
            .count()
    }
}
