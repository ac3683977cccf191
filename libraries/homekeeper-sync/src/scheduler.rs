/// Periodic sync scheduler
use crate::manager::SyncContext;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(crate) struct Scheduler {
    context: Arc<SyncContext>,
    interval: Duration,
}

impl Scheduler {
    pub(crate) fn new(context: Arc<SyncContext>, interval: Duration) -> Self {
        Self { context, interval }
    }

    /// Enqueue every registered directory each interval until `shutdown` fires.
    ///
    /// The first tick fires immediately. Ticks missed while the runtime was busy
    /// are skipped rather than replayed.
    pub(crate) async fn run(self, shutdown: CancellationToken, ready: oneshot::Sender<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Sync scheduler started (every {:?})", self.interval);
        let _ = ready.send(());

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let queued = self.context.enqueue_all().await;
                    debug!("Scheduler tick queued {} directories", queued);
                }
            }
        }

        info!("Sync scheduler stopped");
    }
}
