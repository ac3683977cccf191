//! homekeeper - Directory Sync Orchestrator
//!
//! Keeps a set of local directories mirrored to a remote storage target by
//! driving an external bidirectional sync tool (rclone bisync).
//!
//! This crate provides:
//! - A directory registry with per-directory sync state and history
//! - A deduplicating sync queue (one pending entry per directory)
//! - Worker tasks that never run two syncs of the same directory at once
//! - A periodic scheduler
//! - A lifecycle controller with idempotent start and graceful stop
//!
//! # Example
//!
//! ```rust,no_run
//! use homekeeper_sync::{SyncConfig, SyncOrchestrator};
//! use std::path::Path;
//!
//! # async fn run() -> homekeeper_sync::Result<()> {
//! let orchestrator = SyncOrchestrator::new(SyncConfig::default())?;
//! orchestrator.register_directory(Path::new("/home/me/Documents")).await?;
//! orchestrator.add_exclude_pattern("*.tmp").await?;
//!
//! orchestrator.start("gdrive").await?;
//! orchestrator.resync_one(Path::new("/home/me/Documents")).await?;
//!
//! let status = orchestrator.status().await;
//! println!("{} directories, {} queued", status.directories, status.queue_size);
//!
//! orchestrator.stop().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod excludes;
mod history;
mod manager;
mod queue;
mod rclone;
mod registry;
mod scheduler;
mod tool;
mod types;
mod worker;

// Public exports
pub use config::{SyncConfig, SyncMode};
pub use error::{Result, SyncError};
pub use excludes::ExcludeSet;
pub use history::SyncHistory;
pub use manager::{SyncOrchestrator, ToolFactory};
pub use queue::SyncQueue;
pub use rclone::RcloneTool;
pub use registry::{normalize_path, DirectoryRegistry};
pub use tool::{classify, SyncRequest, SyncResult, SyncTool};
pub use types::{
    Directory, EnqueueOutcome, OrchestratorStatus, StartOutcome, SyncErrorKind, SyncQueueEntry,
    SyncRecord, SyncRecordOutcome, SyncState, SyncStatus, STATUS_SCHEMA_VERSION,
};
