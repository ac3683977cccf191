/// Common test utilities and fixtures
use async_trait::async_trait;
use homekeeper_sync::{
    SyncConfig, SyncError, SyncErrorKind, SyncMode, SyncOrchestrator, SyncRequest, SyncResult,
    SyncState, SyncTool,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One observed tool invocation
#[derive(Debug, Clone)]
pub struct Run {
    pub path: PathBuf,
    pub force_resync: bool,
    pub exclude_patterns: Vec<String>,
    pub started: Instant,
    pub finished: Instant,
}

/// Instrumented stand-in for the sync executable
pub struct FakeTool {
    delay: Duration,
    available: bool,
    failures: Mutex<HashMap<PathBuf, SyncErrorKind>>,
    runs: Mutex<Vec<Run>>,
    started: AtomicUsize,
}

impl FakeTool {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(delay, true))
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self::build(Duration::ZERO, false))
    }

    fn build(delay: Duration, available: bool) -> Self {
        Self {
            delay,
            available,
            failures: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
            started: AtomicUsize::new(0),
        }
    }

    /// Make every following sync of `path` fail with `kind`
    pub fn fail(&self, path: &str, kind: SyncErrorKind) {
        self.failures
            .lock()
            .unwrap()
            .insert(PathBuf::from(path), kind);
    }

    pub fn succeed(&self, path: &str) {
        self.failures.lock().unwrap().remove(Path::new(path));
    }

    /// Completed runs, in completion order
    pub fn runs(&self) -> Vec<Run> {
        self.runs.lock().unwrap().clone()
    }

    pub fn runs_for(&self, path: &str) -> Vec<Run> {
        self.runs()
            .into_iter()
            .filter(|run| run.path == Path::new(path))
            .collect()
    }

    /// Invocations started, including ones still running
    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Assert no two runs of the same directory overlapped in time
    pub fn assert_no_overlap(&self) {
        let mut by_path: HashMap<PathBuf, Vec<Run>> = HashMap::new();
        for run in self.runs() {
            by_path.entry(run.path.clone()).or_default().push(run);
        }

        for (path, mut runs) in by_path {
            runs.sort_by_key(|run| run.started);
            for pair in runs.windows(2) {
                assert!(
                    pair[0].finished <= pair[1].started,
                    "overlapping syncs of {}",
                    path.display()
                );
            }
        }
    }
}

#[async_trait]
impl SyncTool for FakeTool {
    async fn check_available(&self) -> homekeeper_sync::Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(SyncError::ToolUnavailable("fake tool disabled".to_string()))
        }
    }

    async fn run(&self, request: &SyncRequest, cancel: &CancellationToken) -> SyncResult {
        self.started.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        let canceled = tokio::select! {
            () = tokio::time::sleep(self.delay) => false,
            () = cancel.cancelled() => true,
        };

        let finished = Instant::now();
        self.runs.lock().unwrap().push(Run {
            path: request.path.clone(),
            force_resync: request.force_resync,
            exclude_patterns: request.exclude_patterns.clone(),
            started,
            finished,
        });

        if canceled {
            return SyncResult::failure(
                SyncErrorKind::Canceled,
                "interrupted because the sync service is stopping",
                finished - started,
            );
        }

        let failure = self.failures.lock().unwrap().get(&request.path).copied();
        match failure {
            Some(kind) => SyncResult::failure(kind, "ERROR : simulated failure", finished - started),
            None => SyncResult::success("Bisync successful", finished - started),
        }
    }
}

/// Orchestrator wired to `tool`, counting how often a tool was built
pub fn orchestrator_with(
    config: SyncConfig,
    tool: Arc<FakeTool>,
) -> (Arc<SyncOrchestrator>, Arc<AtomicUsize>) {
    let built = Arc::new(AtomicUsize::new(0));
    let counter = built.clone();
    let orchestrator = SyncOrchestrator::with_tool_factory(config, move |_remote| {
        counter.fetch_add(1, Ordering::SeqCst);
        tool.clone() as Arc<dyn SyncTool>
    })
    .unwrap();
    (Arc::new(orchestrator), built)
}

pub fn manual_config() -> SyncConfig {
    SyncConfig {
        mode: SyncMode::Manual,
        stop_grace_seconds: 5,
        ..SyncConfig::default()
    }
}

/// Poll a directory's state until `predicate` holds or the timeout passes
pub async fn wait_for_state<F>(
    orchestrator: &SyncOrchestrator,
    path: &str,
    predicate: F,
) -> SyncState
where
    F: Fn(&SyncState) -> bool,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let state = orchestrator.sync_state(Path::new(path)).await.unwrap();
        if predicate(&state) {
            return state;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {}; last state: {:?}",
            path,
            state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the fake tool has completed at least `count` runs
pub async fn wait_for_runs(tool: &FakeTool, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while tool.runs().len() < count {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {} runs, saw {}",
            count,
            tool.runs().len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
