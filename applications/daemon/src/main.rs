/// Homekeeper - keeps local directories mirrored to a remote
use homekeeper_daemon::{build_orchestrator, render_status, DaemonConfig};
use homekeeper_sync::StartOutcome;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "homekeeper_daemon=info,homekeeper_sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = DaemonConfig::load()?;
    config.validate()?;

    tracing::info!("Starting Homekeeper");
    tracing::info!("Remote: {}", config.remote_name);
    tracing::info!("Sync tool: {}", config.sync.tool_path.display());

    let orchestrator = build_orchestrator(&config).await?;

    if orchestrator.start(&config.remote_name).await? == StartOutcome::AlreadyRunning {
        tracing::warn!("Sync service was already running");
    }
    tracing::info!("\n{}", render_status(&orchestrator.status().await));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    orchestrator.stop().await?;
    tracing::info!("\n{}", render_status(&orchestrator.status().await));

    Ok(())
}
