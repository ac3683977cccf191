use crate::{
    config::{SyncConfig, SyncMode},
    error::{Result, SyncError},
    excludes::ExcludeSet,
    queue::SyncQueue,
    rclone::RcloneTool,
    registry::{normalize_path, DirectoryRegistry},
    scheduler::Scheduler,
    tool::SyncTool,
    types::{
        Directory, EnqueueOutcome, OrchestratorStatus, StartOutcome, SyncRecord, SyncState,
        STATUS_SCHEMA_VERSION,
    },
    worker::SyncWorker,
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Builds the sync tool for a remote when the orchestrator starts
pub type ToolFactory = Arc<dyn Fn(&str) -> Arc<dyn SyncTool> + Send + Sync>;

/// State shared between the orchestrator, its workers, and the scheduler
pub(crate) struct SyncContext {
    pub(crate) registry: DirectoryRegistry,
    pub(crate) queue: SyncQueue,
    pub(crate) excludes: ExcludeSet,
    /// Serializes changes that touch both the registry and the queue
    transitions: Mutex<()>,
}

impl SyncContext {
    pub(crate) fn new(history_size: usize) -> Self {
        Self {
            registry: DirectoryRegistry::new(history_size),
            queue: SyncQueue::new(),
            excludes: ExcludeSet::new(),
            transitions: Mutex::new(()),
        }
    }

    /// Enqueue a registered directory
    pub(crate) async fn enqueue(&self, path: &Path, force_resync: bool) -> Result<EnqueueOutcome> {
        let path = normalize_path(path)?;

        let _guard = self.transitions.lock().await;
        if !self.registry.contains(&path).await {
            return Err(SyncError::UnknownDirectory(path));
        }

        // Marked before the entry becomes visible to workers, so a fast worker
        // cannot finish the sync before the mark lands
        self.registry.mark_queued(&path).await;
        Ok(self.queue.enqueue(&path, force_resync).await)
    }

    /// Enqueue every registered directory for a normal sync.
    ///
    /// Returns how many new queue entries were created.
    pub(crate) async fn enqueue_all(&self) -> usize {
        let _guard = self.transitions.lock().await;
        let mut queued = 0;
        for path in self.registry.paths().await {
            self.registry.mark_queued(&path).await;
            if self.queue.enqueue(&path, false).await == EnqueueOutcome::Queued {
                queued += 1;
            }
        }
        queued
    }

    /// Record a finished sync, keeping the directory `queued` if another
    /// request arrived while it ran
    pub(crate) async fn finish(&self, path: &Path, record: SyncRecord) {
        let _guard = self.transitions.lock().await;
        let requeued = self.queue.is_pending(path).await;
        self.registry.finish_sync(path, record, requeued).await;
    }

    /// Remove a directory and any waiting entry for it
    pub(crate) async fn unregister(&self, path: &Path) -> Result<()> {
        let _guard = self.transitions.lock().await;
        self.registry.unregister(path).await?;
        self.queue.remove(path).await;
        Ok(())
    }

    /// Drop every waiting entry and reset the directories they marked
    pub(crate) async fn drain(&self) -> usize {
        let _guard = self.transitions.lock().await;
        let drained = self.queue.drain().await;
        for entry in &drained {
            self.registry.reset_queued(&entry.path).await;
        }
        drained.len()
    }
}

/// Handles of one started scheduler/worker set
struct RunningSession {
    shutdown: CancellationToken,
    abort: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    scheduler: Option<JoinHandle<()>>,
}

/// Owns the lifecycle of directory synchronization.
///
/// Construct one per process and share it by reference (usually in an `Arc`).
/// Registration, enqueue, and status calls work whether or not the orchestrator
/// is running; queued work is only processed while it is.
pub struct SyncOrchestrator {
    config: SyncConfig,
    context: Arc<SyncContext>,
    tool_factory: ToolFactory,
    /// Guards start/stop as one critical section
    session: Mutex<Option<RunningSession>>,
    /// Remote of the running session; `None` while stopped
    remote_name: RwLock<Option<String>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator that syncs through rclone
    pub fn new(config: SyncConfig) -> Result<Self> {
        let tool_config = config.clone();
        Self::with_tool_factory(config, move |remote_name| {
            Arc::new(RcloneTool::from_config(&tool_config, remote_name)) as Arc<dyn SyncTool>
        })
    }

    /// Create an orchestrator with a custom sync tool
    pub fn with_tool_factory<F>(config: SyncConfig, factory: F) -> Result<Self>
    where
        F: Fn(&str) -> Arc<dyn SyncTool> + Send + Sync + 'static,
    {
        config.validate()?;

        let context = SyncContext::new(config.history_size);

        Ok(Self {
            config,
            context: Arc::new(context),
            tool_factory: Arc::new(factory),
            session: Mutex::new(None),
            remote_name: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Start the scheduler and workers for `remote_name`.
    ///
    /// Returns [`StartOutcome::AlreadyRunning`] without side effects if a session
    /// is active. Returns only after every background task has reported in.
    pub async fn start(&self, remote_name: &str) -> Result<StartOutcome> {
        let mut session = self.session.lock().await;
        if session.is_some() {
            info!("Sync service already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let remote_name = remote_name.trim();
        if remote_name.is_empty() {
            return Err(SyncError::InvalidConfig(
                "remote name must not be empty".to_string(),
            ));
        }

        let tool = (self.tool_factory)(remote_name);
        tool.check_available().await?;

        let shutdown = CancellationToken::new();
        let abort = CancellationToken::new();
        let mut ready = Vec::with_capacity(self.config.workers + 1);

        let mut workers = Vec::with_capacity(self.config.workers);
        for id in 0..self.config.workers {
            let (tx, rx) = oneshot::channel();
            let worker = SyncWorker::new(
                id,
                Arc::clone(&self.context),
                Arc::clone(&tool),
                self.config.timeout_for(false),
                self.config.timeout_for(true),
            );
            workers.push(tokio::spawn(worker.run(shutdown.clone(), abort.clone(), tx)));
            ready.push(rx);
        }

        let scheduler = match self.config.mode {
            SyncMode::Periodic => {
                let (tx, rx) = oneshot::channel();
                let scheduler = Scheduler::new(Arc::clone(&self.context), self.config.interval());
                ready.push(rx);
                Some(tokio::spawn(scheduler.run(shutdown.clone(), tx)))
            }
            SyncMode::Manual => None,
        };

        let launched = RunningSession {
            shutdown,
            abort,
            workers,
            scheduler,
        };

        for rx in ready {
            if rx.await.is_err() {
                error!("A sync task exited before reporting ready");
                launched.shutdown.cancel();
                launched.abort.cancel();
                for handle in launched.workers.iter().chain(launched.scheduler.iter()) {
                    handle.abort();
                }
                return Err(SyncError::WorkerStartup(
                    "background task exited during startup".to_string(),
                ));
            }
        }

        *session = Some(launched);
        *self.remote_name.write().await = Some(remote_name.to_string());

        info!(
            "Sync service started for remote {} ({} worker(s), {:?} mode)",
            remote_name, self.config.workers, self.config.mode
        );
        Ok(StartOutcome::Started)
    }

    /// Stop the scheduler and workers.
    ///
    /// Running syncs get the configured grace period to finish; after that their
    /// subprocesses are killed and the directories end up in the error state with
    /// a cancellation message. Entries still waiting in the queue are dropped.
    pub async fn stop(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        let Some(mut running) = session.take() else {
            debug!("Sync service not running");
            return Ok(());
        };

        info!("Stopping sync service");
        running.shutdown.cancel();

        if let Some(scheduler) = running.scheduler.take() {
            if let Err(e) = scheduler.await {
                error!("Sync scheduler task failed: {}", e);
            }
        }

        let grace = self.config.stop_grace();
        if tokio::time::timeout(grace, join_all(&mut running.workers))
            .await
            .is_err()
        {
            warn!("Syncs still running after {:?}; canceling them", grace);
            running.abort.cancel();
            join_all(&mut running.workers).await;
        }

        let dropped = self.context.drain().await;
        if dropped > 0 {
            debug!("Dropped {} waiting sync requests", dropped);
        }

        *self.remote_name.write().await = None;
        info!("Sync service stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.remote_name.read().await.is_some()
    }

    /// Point-in-time status of the orchestrator and every directory
    pub async fn status(&self) -> OrchestratorStatus {
        let remote_name = self.remote_name.read().await.clone();
        let sync_states = self.context.registry.snapshot().await;

        OrchestratorStatus {
            schema_version: STATUS_SCHEMA_VERSION,
            running: remote_name.is_some(),
            remote_name,
            sync_mode: self.config.mode,
            sync_interval_seconds: self.config.interval_seconds,
            directories: sync_states.len(),
            queue_size: self.context.queue.size().await,
            sync_states,
        }
    }

    /// Queue a normal sync of every registered directory and return immediately
    pub async fn sync_all(&self) -> usize {
        let queued = self.context.enqueue_all().await;
        info!("Queued {} directories for sync", queued);
        queued
    }

    /// Queue a normal sync of one directory
    pub async fn sync_one(&self, path: &Path) -> Result<EnqueueOutcome> {
        self.context.enqueue(path, false).await
    }

    /// Queue a forced resync of one directory, upgrading a waiting normal sync
    pub async fn resync_one(&self, path: &Path) -> Result<EnqueueOutcome> {
        let outcome = self.context.enqueue(path, true).await?;
        info!("Resync of {} requested ({:?})", path.display(), outcome);
        Ok(outcome)
    }

    /// Register a directory for synchronization.
    ///
    /// Returns `false` if it was already registered.
    pub async fn register_directory(&self, path: &Path) -> Result<bool> {
        self.context.registry.register(path).await
    }

    /// Stop managing a directory. Refused while it is syncing.
    pub async fn unregister_directory(&self, path: &Path) -> Result<()> {
        self.context.unregister(&normalize_path(path)?).await
    }

    pub async fn directories(&self) -> Vec<Directory> {
        self.context.registry.directories().await
    }

    pub async fn sync_state(&self, path: &Path) -> Result<SyncState> {
        self.context.registry.get(&normalize_path(path)?).await
    }

    /// Recent syncs of a directory, oldest first
    pub async fn history(&self, path: &Path) -> Result<Vec<SyncRecord>> {
        self.context.registry.history(&normalize_path(path)?).await
    }

    /// Add an exclude pattern applied to every directory from the next sync on
    pub async fn add_exclude_pattern(&self, pattern: &str) -> Result<bool> {
        self.context.excludes.add(pattern).await
    }

    pub async fn list_exclude_patterns(&self) -> Vec<String> {
        self.context.excludes.list().await
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        if let Some(running) = self.session.get_mut().take() {
            running.shutdown.cancel();
            running.abort.cancel();
        }
    }
}

async fn join_all(handles: &mut Vec<JoinHandle<()>>) {
    // Pop only after completion so a timed-out join can resume without re-polling
    while let Some(handle) = handles.last_mut() {
        if let Err(e) = handle.await {
            error!("Sync worker task failed: {}", e);
        }
        handles.pop();
    }
}
