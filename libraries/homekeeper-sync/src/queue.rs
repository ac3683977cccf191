//! Deduplicating sync queue
//!
//! Entries are keyed by directory path. At most one entry per path waits in the
//! queue; a path handed to a worker is tracked as active until the worker calls
//! [`SyncQueue::complete`], and no second entry for that path is handed out
//! before then. This keeps syncs of one directory strictly sequential no matter
//! how many workers drain the queue.

use crate::types::{EnqueueOutcome, SyncQueueEntry};
use chrono::Utc;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Default)]
struct QueueInner {
    pending: VecDeque<SyncQueueEntry>,
    active: HashSet<PathBuf>,
}

impl QueueInner {
    /// Remove the oldest entry whose directory is not being synced
    fn take_ready(&mut self) -> Option<SyncQueueEntry> {
        let index = self
            .pending
            .iter()
            .position(|entry| !self.active.contains(&entry.path))?;
        let entry = self.pending.remove(index)?;
        self.active.insert(entry.path.clone());
        Some(entry)
    }
}

#[derive(Debug, Default)]
pub struct SyncQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl SyncQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a sync of `path`.
    ///
    /// If an entry for `path` is already waiting, the call only upgrades it to a
    /// forced resync when `force_resync` is set. A path that is currently being
    /// synced gets a fresh entry which runs after the active sync finishes.
    pub async fn enqueue(&self, path: &Path, force_resync: bool) -> EnqueueOutcome {
        let mut inner = self.inner.lock().await;

        if let Some(existing) = inner.pending.iter_mut().find(|e| e.path == path) {
            if force_resync && !existing.force_resync {
                existing.force_resync = true;
                debug!("Escalated pending sync of {} to resync", path.display());
                return EnqueueOutcome::Escalated;
            }
            return EnqueueOutcome::AlreadyPending;
        }

        inner.pending.push_back(SyncQueueEntry {
            path: path.to_path_buf(),
            force_resync,
            enqueued_at: Utc::now(),
        });
        debug!(
            "Enqueued {} (resync: {}, pending: {})",
            path.display(),
            force_resync,
            inner.pending.len()
        );
        drop(inner);

        self.notify.notify_waiters();
        EnqueueOutcome::Queued
    }

    /// Wait for the next entry that can run.
    ///
    /// Returns `None` once `shutdown` is cancelled. The returned path stays
    /// active until [`Self::complete`] is called for it.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<SyncQueueEntry> {
        loop {
            // Register interest before checking so a concurrent enqueue is not missed
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if shutdown.is_cancelled() {
                return None;
            }

            if let Some(entry) = self.try_dequeue().await {
                return Some(entry);
            }

            tokio::select! {
                () = shutdown.cancelled() => return None,
                () = &mut notified => {}
            }
        }
    }

    /// Take the next runnable entry without waiting
    pub async fn try_dequeue(&self) -> Option<SyncQueueEntry> {
        self.inner.lock().await.take_ready()
    }

    /// Release a path handed out by [`Self::dequeue`]
    pub async fn complete(&self, path: &Path) {
        let released = self.inner.lock().await.active.remove(path);
        if released {
            // A waiting entry for this path may now be runnable
            self.notify.notify_waiters();
        }
    }

    /// Drop a waiting entry for `path`, if any
    pub async fn remove(&self, path: &Path) -> Option<SyncQueueEntry> {
        let mut inner = self.inner.lock().await;
        let index = inner.pending.iter().position(|e| e.path == path)?;
        inner.pending.remove(index)
    }

    /// Remove and return all waiting entries
    pub async fn drain(&self) -> Vec<SyncQueueEntry> {
        self.inner.lock().await.pending.drain(..).collect()
    }

    /// Number of entries waiting to be picked up
    pub async fn size(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Whether an entry for `path` is waiting to be picked up
    pub async fn is_pending(&self, path: &Path) -> bool {
        self.inner
            .lock()
            .await
            .pending
            .iter()
            .any(|entry| entry.path == path)
    }

    pub async fn is_active(&self, path: &Path) -> bool {
        self.inner.lock().await.active.contains(path)
    }
}
