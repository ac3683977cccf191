/// rclone bisync wrapper
use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    tool::{classify, SyncRequest, SyncResult, SyncTool},
    types::SyncErrorKind,
};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RcloneTool {
    tool_path: PathBuf,
    remote_name: String,
    local_root: Option<PathBuf>,
    remote_root: Option<String>,
    extra_args: Vec<String>,
}

impl RcloneTool {
    pub fn new(tool_path: impl Into<PathBuf>, remote_name: impl Into<String>) -> Self {
        Self {
            tool_path: tool_path.into(),
            remote_name: remote_name.into(),
            local_root: None,
            remote_root: None,
            extra_args: Vec::new(),
        }
    }

    /// Build a tool for `remote_name` using the path mapping and flags from `config`
    pub fn from_config(config: &SyncConfig, remote_name: &str) -> Self {
        Self {
            tool_path: config.tool_path.clone(),
            remote_name: remote_name.to_string(),
            local_root: config.local_root.clone(),
            remote_root: config.remote_root.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    pub fn with_local_root(mut self, local_root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(local_root.into());
        self
    }

    pub fn with_remote_root(mut self, remote_root: impl Into<String>) -> Self {
        self.remote_root = Some(remote_root.into());
        self
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Remote location mirroring `local`, e.g. `gdrive:Backup/Documents`
    pub fn remote_path(&self, local: &Path) -> String {
        let relative = self
            .local_root
            .as_deref()
            .and_then(|root| local.strip_prefix(root).ok())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| local.components().skip(1).collect());

        let relative = relative.to_string_lossy().replace('\\', "/");
        let remote_root = self
            .remote_root
            .as_deref()
            .map(|root| root.trim_matches('/'))
            .filter(|root| !root.is_empty());

        match (remote_root, relative.is_empty()) {
            (Some(root), true) => format!("{}:{}", self.remote_name, root),
            (Some(root), false) => format!("{}:{}/{}", self.remote_name, root, relative),
            (None, _) => format!("{}:{}", self.remote_name, relative),
        }
    }

    /// Arguments for one bisync pass.
    ///
    /// With `resync` set, the pass rebuilds bisync's listing cache. A resync
    /// copies files missing on either side and deletes nothing, so it must
    /// follow [`Self::mirror_args`] to keep local deletions.
    pub fn bisync_args(&self, request: &SyncRequest, resync: bool) -> Vec<OsString> {
        let mut args = self.command_args("bisync", request);

        if resync {
            args.push("--resync".into());
            args.push("--resync-mode".into());
            args.push("path1".into());
        }

        args
    }

    /// Arguments for a one-way pass making the remote match the local directory.
    ///
    /// Files deleted locally are deleted on the remote.
    pub fn mirror_args(&self, request: &SyncRequest) -> Vec<OsString> {
        self.command_args("sync", request)
    }

    fn command_args(&self, command: &str, request: &SyncRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.extra_args.iter().map(OsString::from).collect();
        args.push(command.into());
        args.push(request.path.clone().into_os_string());
        args.push(self.remote_path(&request.path).into());

        for pattern in &request.exclude_patterns {
            args.push("--exclude".into());
            args.push(pattern.into());
        }

        args
    }

    /// Run the tool once, killing it when `deadline` passes or `cancel` fires
    async fn invoke(
        &self,
        args: Vec<OsString>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> SyncResult {
        let started = Instant::now();

        let mut cmd = Command::new(&self.tool_path);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Running {} {:?}", self.tool_path.display(), args);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let kind = match e.kind() {
                    ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                        SyncErrorKind::ToolUnavailable
                    }
                    _ => SyncErrorKind::Unknown,
                };
                return SyncResult::failure(
                    kind,
                    format!("failed to launch {}: {}", self.tool_path.display(), e),
                    started.elapsed(),
                );
            }
        };

        // Dropping the wait future drops the child, which kills it
        let output = tokio::select! {
            res = tokio::time::timeout_at(deadline, child.wait_with_output()) => match res {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return SyncResult::failure(
                        SyncErrorKind::Unknown,
                        format!("failed to wait for {}: {}", self.tool_path.display(), e),
                        started.elapsed(),
                    );
                }
                Err(_) => {
                    return SyncResult::failure(
                        SyncErrorKind::Timeout,
                        String::new(),
                        started.elapsed(),
                    );
                }
            },
            () = cancel.cancelled() => {
                return SyncResult::failure(
                    SyncErrorKind::Canceled,
                    "interrupted because the sync service is stopping",
                    started.elapsed(),
                );
            }
        };

        let exit_code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        SyncResult {
            error_kind: classify(exit_code, &stderr),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            duration: started.elapsed(),
        }
    }
}

#[async_trait]
impl SyncTool for RcloneTool {
    async fn check_available(&self) -> Result<()> {
        let probe = Command::new(&self.tool_path)
            .arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(VERSION_PROBE_TIMEOUT, probe)
            .await
            .map_err(|_| {
                SyncError::ToolUnavailable(format!(
                    "{} version did not respond within {:?}",
                    self.tool_path.display(),
                    VERSION_PROBE_TIMEOUT
                ))
            })?
            .map_err(|e| {
                SyncError::ToolUnavailable(format!("{}: {}", self.tool_path.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::ToolUnavailable(format!(
                "{} version failed: {}",
                self.tool_path.display(),
                stderr.trim()
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        info!(
            "Using {} ({})",
            self.tool_path.display(),
            version.lines().next().unwrap_or("unknown version").trim()
        );
        Ok(())
    }

    async fn run(&self, request: &SyncRequest, cancel: &CancellationToken) -> SyncResult {
        let started = Instant::now();
        let deadline = started + request.timeout;

        let mut passes = Vec::with_capacity(3);
        if request.force_resync {
            info!("Rebuilding sync state for {}", request.path.display());
            passes.push(self.mirror_args(request));
            passes.push(self.bisync_args(request, true));
        }
        passes.push(self.bisync_args(request, false));

        let mut output = String::new();
        let mut result = SyncResult::success(String::new(), Duration::ZERO);
        for args in passes {
            result = self.invoke(args, deadline, cancel).await;
            output.push_str(&result.stdout);
            if !result.is_success() {
                break;
            }
        }

        result.stdout = output;
        result.duration = started.elapsed();
        result
    }
}
