//! Interface to the external bidirectional sync executable

use crate::error::Result;
use crate::types::SyncErrorKind;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exit code shells use for "command not found"
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Exit code rclone uses for temporary errors worth retrying
const EXIT_RETRYABLE: i32 = 5;

const MAX_DETAIL_LEN: usize = 500;

/// Matched as substrings, so status codes only count with an HTTP context
const AUTH_MARKERS: &[&str] = &[
    "error 401",
    "status 401",
    "http 401",
    "code 401",
    "unauthorized",
    "unauthenticated",
    "invalid_grant",
    "token expired",
    "oauth2",
    "didn't find section in config file",
    "couldn't find section",
    "authentication",
];

const CONFLICT_MARKERS: &[&str] = &[
    "must run --resync",
    "bisync aborted",
    "critical error",
    "too many deletes",
    "cannot find prior",
];

const NETWORK_MARKERS: &[&str] = &[
    "no such host",
    "connection refused",
    "connection reset",
    "network is unreachable",
    "i/o timeout",
    "tls handshake",
    "dial tcp",
    "temporary failure in name resolution",
];

/// A single sync invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub path: PathBuf,
    pub exclude_patterns: Vec<String>,
    pub force_resync: bool,
    pub timeout: Duration,
}

/// What the sync tool reported back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    /// `None` when the sync succeeded
    pub error_kind: Option<SyncErrorKind>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl SyncResult {
    pub fn success(stdout: impl Into<String>, duration: Duration) -> Self {
        Self {
            error_kind: None,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            duration,
        }
    }

    pub fn failure(kind: SyncErrorKind, stderr: impl Into<String>, duration: Duration) -> Self {
        Self {
            error_kind: Some(kind),
            exit_code: None,
            stdout: String::new(),
            stderr: stderr.into(),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error_kind.is_none()
    }

    /// Last meaningful line of stderr, falling back to stdout
    pub fn detail(&self) -> Option<String> {
        last_line(&self.stderr)
            .or_else(|| last_line(&self.stdout))
            .map(|line| truncate(line, MAX_DETAIL_LEN))
    }

    /// Human-readable description of a failed result
    pub fn error_message(&self) -> Option<String> {
        let kind = self.error_kind?;
        Some(match self.detail() {
            Some(detail) => format!("{}: {}", kind, detail),
            None => match self.exit_code {
                Some(code) => format!("{} (exit code {})", kind, code),
                None => kind.to_string(),
            },
        })
    }
}

/// The remote bidirectional-sync executable.
///
/// Implementations enforce `request.timeout` themselves and must return promptly
/// with [`SyncErrorKind::Canceled`] once `cancel` fires, terminating any child
/// process they started.
#[async_trait]
pub trait SyncTool: Send + Sync {
    /// Verify the tool can be executed at all
    async fn check_available(&self) -> Result<()>;

    /// Run one bidirectional sync of `request.path`
    async fn run(&self, request: &SyncRequest, cancel: &CancellationToken) -> SyncResult;
}

/// Classify a finished tool invocation from its exit code and stderr
pub fn classify(exit_code: Option<i32>, stderr: &str) -> Option<SyncErrorKind> {
    if exit_code == Some(0) {
        return None;
    }

    let stderr = stderr.to_lowercase();
    let mentions = |markers: &[&str]| markers.iter().any(|m| stderr.contains(m));

    let kind = if exit_code == Some(EXIT_COMMAND_NOT_FOUND) {
        SyncErrorKind::ToolUnavailable
    } else if mentions(AUTH_MARKERS) {
        SyncErrorKind::AuthError
    } else if mentions(CONFLICT_MARKERS) {
        SyncErrorKind::ConflictError
    } else if mentions(NETWORK_MARKERS) || exit_code == Some(EXIT_RETRYABLE) {
        SyncErrorKind::NetworkError
    } else {
        SyncErrorKind::Unknown
    };
    Some(kind)
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rev().find(|line| !line.is_empty())
}

fn truncate(line: &str, max: usize) -> String {
    if line.chars().count() <= max {
        return line.to_string();
    }
    let mut truncated: String = line.chars().take(max).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_zero_is_success() {
        assert_eq!(classify(Some(0), "some warning"), None);
    }

    #[test]
    fn classifies_auth_errors() {
        assert_eq!(
            classify(
                Some(1),
                "Failed to create file system: didn't find section in config file \"gdrive\""
            ),
            Some(SyncErrorKind::AuthError)
        );
        assert_eq!(
            classify(Some(7), "oauth2: cannot fetch token: 400 invalid_grant"),
            Some(SyncErrorKind::AuthError)
        );
    }

    #[test]
    fn classifies_conflicts() {
        assert_eq!(
            classify(
                Some(2),
                "ERROR : Bisync critical error: cannot find prior Path1 or Path2 listings\nERROR : Bisync aborted. Must run --resync to recover."
            ),
            Some(SyncErrorKind::ConflictError)
        );
    }

    #[test]
    fn status_code_digits_in_paths_are_not_auth_errors() {
        assert_eq!(
            classify(
                Some(1),
                "ERROR : Photos/IMG_4012.jpg: failed to copy: read tcp 10.0.0.2:4401: connection reset by peer"
            ),
            Some(SyncErrorKind::NetworkError)
        );
        assert_eq!(
            classify(Some(1), "ERROR : googleapi: Error 401: Invalid Credentials"),
            Some(SyncErrorKind::AuthError)
        );
    }

    #[test]
    fn local_permission_errors_are_not_auth_errors() {
        assert_eq!(
            classify(
                Some(1),
                "ERROR : /home/me/Documents/private.key: open: permission denied"
            ),
            Some(SyncErrorKind::Unknown)
        );
    }

    #[test]
    fn classifies_network_errors() {
        assert_eq!(
            classify(Some(1), "dial tcp: lookup www.googleapis.com: no such host"),
            Some(SyncErrorKind::NetworkError)
        );
        assert_eq!(classify(Some(5), ""), Some(SyncErrorKind::NetworkError));
    }

    #[test]
    fn command_not_found_is_tool_unavailable() {
        assert_eq!(
            classify(Some(127), "sh: rclone: not found"),
            Some(SyncErrorKind::ToolUnavailable)
        );
    }

    #[test]
    fn unrecognised_failure_is_unknown() {
        assert_eq!(
            classify(Some(3), "directory not found"),
            Some(SyncErrorKind::Unknown)
        );
        assert_eq!(classify(None, ""), Some(SyncErrorKind::Unknown));
    }

    #[test]
    fn error_message_uses_last_stderr_line() {
        let mut result = SyncResult::failure(
            SyncErrorKind::NetworkError,
            "NOTICE: starting\nERROR : connection refused\n\n",
            Duration::from_secs(1),
        );
        assert_eq!(
            result.error_message().unwrap(),
            "network error: ERROR : connection refused"
        );

        result.stderr.clear();
        result.exit_code = Some(5);
        assert_eq!(result.error_message().unwrap(), "network error (exit code 5)");
    }

    #[test]
    fn success_has_no_error_message() {
        let result = SyncResult::success("done", Duration::ZERO);
        assert!(result.is_success());
        assert!(result.error_message().is_none());
    }

    #[test]
    fn long_detail_is_truncated() {
        let result = SyncResult::failure(
            SyncErrorKind::Unknown,
            "x".repeat(2000),
            Duration::ZERO,
        );
        assert_eq!(result.detail().unwrap().chars().count(), MAX_DETAIL_LEN + 1);
    }
}
