//! Directory registry and per-directory sync state store
//!
//! Readers get point-in-time copies; the lock is only held for the copy.
//! State transitions into and out of `syncing` are performed by the worker.

use crate::error::{Result, SyncError};
use crate::history::SyncHistory;
use crate::types::{Directory, SyncRecord, SyncRecordOutcome, SyncState, SyncStatus};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct DirectoryEntry {
    directory: Directory,
    state: SyncState,
    history: SyncHistory,
}

/// Outcome of trying to mark a directory as syncing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BeginSync {
    Started,
    AlreadySyncing,
    NotRegistered,
}

/// The set of managed directories together with their sync state
#[derive(Debug)]
pub struct DirectoryRegistry {
    entries: RwLock<BTreeMap<PathBuf, DirectoryEntry>>,
    history_size: usize,
}

impl DirectoryRegistry {
    pub fn new(history_size: usize) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            history_size,
        }
    }

    /// Register a directory with an `idle` state.
    ///
    /// Returns `false` if the path was already registered.
    pub async fn register(&self, path: &Path) -> Result<bool> {
        let path = normalize_path(path)?;
        let mut entries = self.entries.write().await;

        if entries.contains_key(&path) {
            return Ok(false);
        }

        info!("Registered directory {}", path.display());
        entries.insert(
            path.clone(),
            DirectoryEntry {
                directory: Directory {
                    path,
                    registered_at: Utc::now(),
                },
                state: SyncState::default(),
                history: SyncHistory::new(self.history_size),
            },
        );
        Ok(true)
    }

    /// Remove a directory that is not currently syncing
    pub async fn unregister(&self, path: &Path) -> Result<()> {
        let path = normalize_path(path)?;
        let mut entries = self.entries.write().await;

        match entries.get(&path) {
            None => Err(SyncError::UnknownDirectory(path)),
            Some(entry) if entry.state.is_syncing() => Err(SyncError::DirectoryBusy(path)),
            Some(_) => {
                entries.remove(&path);
                info!("Unregistered directory {}", path.display());
                Ok(())
            }
        }
    }

    pub async fn contains(&self, path: &Path) -> bool {
        self.entries.read().await.contains_key(path)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Registered paths in sorted order
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn directories(&self) -> Vec<Directory> {
        self.entries
            .read()
            .await
            .values()
            .map(|entry| entry.directory.clone())
            .collect()
    }

    /// Copy of the state of one directory
    pub async fn get(&self, path: &Path) -> Result<SyncState> {
        self.entries
            .read()
            .await
            .get(path)
            .map(|entry| entry.state.clone())
            .ok_or_else(|| SyncError::UnknownDirectory(path.to_path_buf()))
    }

    /// Consistent copy of every directory's state
    pub async fn snapshot(&self) -> BTreeMap<PathBuf, SyncState> {
        self.entries
            .read()
            .await
            .iter()
            .map(|(path, entry)| (path.clone(), entry.state.clone()))
            .collect()
    }

    /// Recent sync records for a directory, oldest first
    pub async fn history(&self, path: &Path) -> Result<Vec<SyncRecord>> {
        self.entries
            .read()
            .await
            .get(path)
            .map(|entry| entry.history.to_vec())
            .ok_or_else(|| SyncError::UnknownDirectory(path.to_path_buf()))
    }

    /// Move an idle directory to `queued`. Other states are left alone.
    pub(crate) async fn mark_queued(&self, path: &Path) {
        if let Some(entry) = self.entries.write().await.get_mut(path) {
            if entry.state.status == SyncStatus::Idle {
                entry.state.status = SyncStatus::Queued;
            }
        }
    }

    /// Undo [`Self::mark_queued`] for an entry that will never be processed
    pub(crate) async fn reset_queued(&self, path: &Path) {
        if let Some(entry) = self.entries.write().await.get_mut(path) {
            if entry.state.status == SyncStatus::Queued {
                entry.state.status = SyncStatus::Idle;
            }
        }
    }

    /// Mark a directory as syncing and clear its previous error
    pub(crate) async fn begin_sync(&self, path: &Path) -> BeginSync {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(path) else {
            return BeginSync::NotRegistered;
        };

        if entry.state.is_syncing() {
            return BeginSync::AlreadySyncing;
        }

        entry.state.status = SyncStatus::Syncing;
        entry.state.error_message = None;
        entry.state.last_error_kind = None;
        debug!("Directory {} is now syncing", path.display());
        BeginSync::Started
    }

    /// Apply the outcome of a finished sync and append it to the history.
    ///
    /// `requeued` tells whether another request for the directory is already
    /// waiting; a success then leaves it `queued` instead of `idle`.
    pub(crate) async fn finish_sync(&self, path: &Path, record: SyncRecord, requeued: bool) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(path) else {
            warn!(
                "Directory {} disappeared while syncing; dropping result",
                path.display()
            );
            return;
        };

        match &record.outcome {
            SyncRecordOutcome::Success => {
                entry.state.status = if requeued {
                    SyncStatus::Queued
                } else {
                    SyncStatus::Idle
                };
                entry.state.last_sync_time = Some(record.finished_at);
                entry.state.error_message = None;
                entry.state.last_error_kind = None;
                entry.state.consecutive_failures = 0;
            }
            SyncRecordOutcome::Failed { kind, message } => {
                entry.state.status = SyncStatus::Error;
                entry.state.error_message = Some(if message.is_empty() {
                    kind.to_string()
                } else {
                    message.clone()
                });
                entry.state.last_error_kind = Some(*kind);
                if kind.is_health_problem() {
                    entry.state.consecutive_failures =
                        entry.state.consecutive_failures.saturating_add(1);
                }
            }
        }

        entry.history.push(record);
    }
}

/// Validate and canonicalize a directory path lexically.
///
/// The path must be absolute and free of `..` components. Trailing separators
/// and `.` components are dropped so equivalent spellings map to one key.
pub fn normalize_path(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(SyncError::InvalidPath(format!(
            "{} is not absolute",
            path.display()
        )));
    }

    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(SyncError::InvalidPath(format!(
                    "{} contains '..'",
                    path.display()
                )));
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyncErrorKind;

    fn record(outcome: SyncRecordOutcome) -> SyncRecord {
        SyncRecord {
            run_id: "run".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            forced: false,
            outcome,
        }
    }

    fn failure(kind: SyncErrorKind) -> SyncRecordOutcome {
        SyncRecordOutcome::Failed {
            kind,
            message: format!("{}: boom", kind),
        }
    }

    #[tokio::test]
    async fn register_creates_idle_state() {
        let registry = DirectoryRegistry::new(10);
        assert!(registry.register(Path::new("/a")).await.unwrap());

        let state = registry.get(Path::new("/a")).await.unwrap();
        assert_eq!(state.status, SyncStatus::Idle);
        assert!(state.last_sync_time.is_none());
        assert!(state.error_message.is_none());
    }

    #[tokio::test]
    async fn re_register_is_noop() {
        let registry = DirectoryRegistry::new(10);
        registry.register(Path::new("/a")).await.unwrap();
        registry.begin_sync(Path::new("/a")).await;

        assert!(!registry.register(Path::new("/a/")).await.unwrap());
        assert_eq!(registry.len().await, 1);
        // existing state untouched
        assert!(registry.get(Path::new("/a")).await.unwrap().is_syncing());
    }

    #[tokio::test]
    async fn rejects_relative_and_parent_paths() {
        let registry = DirectoryRegistry::new(10);
        assert!(matches!(
            registry.register(Path::new("docs")).await,
            Err(SyncError::InvalidPath(_))
        ));
        assert!(matches!(
            registry.register(Path::new("/home/../etc")).await,
            Err(SyncError::InvalidPath(_))
        ));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn get_unknown_directory() {
        let registry = DirectoryRegistry::new(10);
        assert!(matches!(
            registry.get(Path::new("/missing")).await,
            Err(SyncError::UnknownDirectory(_))
        ));
    }

    #[tokio::test]
    async fn begin_sync_clears_error() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(failure(SyncErrorKind::NetworkError)), false)
            .await;
        let state = registry.get(path).await.unwrap();
        assert_eq!(state.status, SyncStatus::Error);
        assert!(state.error_message.is_some());

        assert_eq!(registry.begin_sync(path).await, BeginSync::Started);
        let state = registry.get(path).await.unwrap();
        assert_eq!(state.status, SyncStatus::Syncing);
        assert!(state.error_message.is_none());
        assert!(state.last_error_kind.is_none());
    }

    #[tokio::test]
    async fn begin_sync_twice_is_refused() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        assert_eq!(registry.begin_sync(path).await, BeginSync::Started);
        assert_eq!(registry.begin_sync(path).await, BeginSync::AlreadySyncing);
        assert_eq!(
            registry.begin_sync(Path::new("/b")).await,
            BeginSync::NotRegistered
        );
    }

    #[tokio::test]
    async fn failure_keeps_last_sync_time() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(SyncRecordOutcome::Success), false)
            .await;
        let synced_at = registry.get(path).await.unwrap().last_sync_time;
        assert!(synced_at.is_some());

        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(failure(SyncErrorKind::Timeout)), false)
            .await;
        let state = registry.get(path).await.unwrap();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.last_sync_time, synced_at);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(registry.history(path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_is_not_counted_as_failure() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(failure(SyncErrorKind::Canceled)), false)
            .await;
        let state = registry.get(path).await.unwrap();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.last_error_kind, Some(SyncErrorKind::Canceled));
        assert_eq!(state.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn empty_failure_message_falls_back_to_kind() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.begin_sync(path).await;
        registry
            .finish_sync(
                path,
                record(SyncRecordOutcome::Failed {
                    kind: SyncErrorKind::Unknown,
                    message: String::new(),
                }),
                false,
            )
            .await;
        let message = registry.get(path).await.unwrap().error_message.unwrap();
        assert!(!message.is_empty());
    }

    #[tokio::test]
    async fn success_with_waiting_request_stays_queued() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(SyncRecordOutcome::Success), true)
            .await;
        let state = registry.get(path).await.unwrap();
        assert_eq!(state.status, SyncStatus::Queued);
        assert!(state.last_sync_time.is_some());

        // a failure stays visible even with a waiting request
        registry.begin_sync(path).await;
        registry
            .finish_sync(path, record(failure(SyncErrorKind::Timeout)), true)
            .await;
        assert_eq!(registry.get(path).await.unwrap().status, SyncStatus::Error);
    }

    #[tokio::test]
    async fn queued_marks_only_idle() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();

        registry.mark_queued(path).await;
        assert_eq!(
            registry.get(path).await.unwrap().status,
            SyncStatus::Queued
        );
        registry.reset_queued(path).await;
        assert_eq!(registry.get(path).await.unwrap().status, SyncStatus::Idle);

        registry.begin_sync(path).await;
        registry.mark_queued(path).await;
        assert_eq!(
            registry.get(path).await.unwrap().status,
            SyncStatus::Syncing
        );
    }

    #[tokio::test]
    async fn unregister_refuses_syncing_directory() {
        let registry = DirectoryRegistry::new(10);
        let path = Path::new("/a");
        registry.register(path).await.unwrap();
        registry.begin_sync(path).await;

        assert!(matches!(
            registry.unregister(path).await,
            Err(SyncError::DirectoryBusy(_))
        ));

        registry
            .finish_sync(path, record(SyncRecordOutcome::Success), false)
            .await;
        registry.unregister(path).await.unwrap();
        assert!(!registry.contains(path).await);
    }

    #[tokio::test]
    async fn snapshot_is_a_copy() {
        let registry = DirectoryRegistry::new(10);
        registry.register(Path::new("/b")).await.unwrap();
        registry.register(Path::new("/a")).await.unwrap();

        let snapshot = registry.snapshot().await;
        registry.begin_sync(Path::new("/a")).await;

        let keys: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(keys, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
        assert_eq!(snapshot[Path::new("/a")].status, SyncStatus::Idle);
    }

    #[test]
    fn normalize_strips_trailing_separator_and_dots() {
        assert_eq!(
            normalize_path(Path::new("/home/me/./docs/")).unwrap(),
            PathBuf::from("/home/me/docs")
        );
    }
}
