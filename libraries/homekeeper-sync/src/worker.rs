/// Background sync worker
use crate::{
    manager::SyncContext,
    registry::BeginSync,
    tool::{SyncRequest, SyncTool},
    types::{SyncQueueEntry, SyncRecord, SyncRecordOutcome},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

pub(crate) struct SyncWorker {
    id: usize,
    context: Arc<SyncContext>,
    tool: Arc<dyn SyncTool>,
    timeout: Duration,
    resync_timeout: Duration,
}

impl SyncWorker {
    pub(crate) fn new(
        id: usize,
        context: Arc<SyncContext>,
        tool: Arc<dyn SyncTool>,
        timeout: Duration,
        resync_timeout: Duration,
    ) -> Self {
        Self {
            id,
            context,
            tool,
            timeout,
            resync_timeout,
        }
    }

    /// Drain the queue until `shutdown` fires.
    ///
    /// `abort` is forwarded to the tool so an in-flight subprocess can be killed.
    pub(crate) async fn run(
        self,
        shutdown: CancellationToken,
        abort: CancellationToken,
        ready: oneshot::Sender<()>,
    ) {
        info!("Sync worker {} started", self.id);
        let _ = ready.send(());

        while let Some(entry) = self.context.queue.dequeue(&shutdown).await {
            self.process(&entry, &abort).await;
            self.context.queue.complete(&entry.path).await;
        }

        info!("Sync worker {} stopped", self.id);
    }

    async fn process(&self, entry: &SyncQueueEntry, abort: &CancellationToken) {
        let path = &entry.path;

        match self.context.registry.begin_sync(path).await {
            BeginSync::Started => {}
            BeginSync::AlreadySyncing => {
                warn!(
                    "Worker {} skipping {}: a sync is already running",
                    self.id,
                    path.display()
                );
                return;
            }
            BeginSync::NotRegistered => {
                warn!(
                    "Worker {} skipping {}: directory no longer registered",
                    self.id,
                    path.display()
                );
                return;
            }
        }

        let request = SyncRequest {
            path: path.clone(),
            exclude_patterns: self.context.excludes.list().await,
            force_resync: entry.force_resync,
            timeout: if entry.force_resync {
                self.resync_timeout
            } else {
                self.timeout
            },
        };

        info!(
            "Worker {} syncing {}{}",
            self.id,
            path.display(),
            if entry.force_resync { " (resync)" } else { "" }
        );

        let started_at = Utc::now();
        let result = self.tool.run(&request, abort).await;
        let finished_at = Utc::now();

        let outcome = match (result.error_kind, result.error_message()) {
            (Some(kind), Some(message)) => {
                error!(
                    "Worker {} failed to sync {}: {}",
                    self.id,
                    path.display(),
                    message
                );
                SyncRecordOutcome::Failed { kind, message }
            }
            _ => {
                info!(
                    "Worker {} synced {} in {:.1}s",
                    self.id,
                    path.display(),
                    result.duration.as_secs_f64()
                );
                SyncRecordOutcome::Success
            }
        };

        self.context
            .finish(
                path,
                SyncRecord {
                    run_id: Uuid::new_v4().to_string(),
                    started_at,
                    finished_at,
                    forced: entry.force_resync,
                    outcome,
                },
            )
            .await;
    }
}
