//! Homekeeper daemon library
//!
//! Configuration loading, orchestrator wiring and status rendering for the
//! `homekeeper` binary.
//!
//! This library exposes the daemon components for testing purposes.

pub mod config;
pub mod error;
pub mod status;

pub use config::DaemonConfig;
pub use error::{DaemonError, Result};
pub use status::{render_status, render_status_at};

use homekeeper_sync::SyncOrchestrator;
use tracing::{info, warn};

/// Build an orchestrator with the configured directories and exclude patterns.
///
/// The orchestrator is returned stopped.
pub async fn build_orchestrator(config: &DaemonConfig) -> Result<SyncOrchestrator> {
    let orchestrator = SyncOrchestrator::new(config.sync.clone())?;

    for pattern in &config.exclude_patterns {
        orchestrator.add_exclude_pattern(pattern).await?;
    }

    for dir in &config.directories {
        if !dir.is_dir() {
            warn!("Sync directory {} does not exist yet", dir.display());
        }
        orchestrator.register_directory(dir).await?;
    }

    if config.directories.is_empty() {
        warn!("No directories configured; nothing will be synced");
    } else {
        info!(
            "Managing {} directories with {} exclude patterns",
            config.directories.len(),
            config.exclude_patterns.len()
        );
    }

    Ok(orchestrator)
}
