/// Human-readable status report
use chrono::{DateTime, Utc};
use homekeeper_sync::{OrchestratorStatus, SyncMode, SyncState, SyncStatus};
use std::fmt::Write;
use std::path::Path;

/// Render a status snapshot as multi-line text
pub fn render_status(status: &OrchestratorStatus) -> String {
    render_status_at(status, Utc::now())
}

/// Render a status snapshot, computing ages relative to `now`
pub fn render_status_at(status: &OrchestratorStatus, now: DateTime<Utc>) -> String {
    let mut out = String::new();

    let mode = match status.sync_mode {
        SyncMode::Periodic => format!("every {}", format_seconds(status.sync_interval_seconds)),
        SyncMode::Manual => "manual".to_string(),
    };
    match (&status.remote_name, status.running) {
        (Some(remote), true) => {
            let _ = writeln!(out, "Sync service: running (remote {}, {})", remote, mode);
        }
        _ => {
            let _ = writeln!(out, "Sync service: stopped ({})", mode);
        }
    }

    let _ = writeln!(
        out,
        "Directories: {}, queued: {}, failing: {}",
        status.directories,
        status.queue_size,
        status.failing_directories()
    );

    let width = status
        .sync_states
        .keys()
        .map(|path| path.display().to_string().chars().count())
        .max()
        .unwrap_or(0);

    for (path, state) in &status.sync_states {
        render_directory(&mut out, path, state, width, now);
    }

    out
}

fn render_directory(
    out: &mut String,
    path: &Path,
    state: &SyncState,
    width: usize,
    now: DateTime<Utc>,
) {
    let last_sync = match state.last_sync_time {
        Some(time) => format!(
            "last sync {} ({})",
            time.format("%Y-%m-%d %H:%M:%S UTC"),
            format_age(now - time)
        ),
        None => "never synced".to_string(),
    };

    let _ = writeln!(
        out,
        "  {:<width$}  {:<7}  {}",
        path.display().to_string(),
        state.status.to_string(),
        last_sync,
        width = width
    );

    if state.status == SyncStatus::Error {
        if let Some(message) = &state.error_message {
            let _ = writeln!(out, "    {}", message);
        }
        if state.consecutive_failures > 1 {
            let _ = writeln!(
                out,
                "    failed {} times in a row",
                state.consecutive_failures
            );
        }
    }
}

fn format_age(age: chrono::Duration) -> String {
    let seconds = age.num_seconds();
    if seconds < 60 {
        "just now".to_string()
    } else if seconds < 3600 {
        format!("{}m ago", seconds / 60)
    } else if seconds < 86_400 {
        format!("{}h ago", seconds / 3600)
    } else {
        format!("{}d ago", seconds / 86_400)
    }
}

fn format_seconds(seconds: u64) -> String {
    if seconds % 3600 == 0 {
        format!("{}h", seconds / 3600)
    } else if seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}
