use anyhow::Result;
use ldp_observability::setup_tracing;
use ldp_server::bootstrap::build_application;
use ldp_server::config::AppConfig;
use ldp_server::core::sync::spawn_sync;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load_from_env()?;
    setup_tracing(config.tracing())
        .map_err(|err| anyhow::anyhow!("failed to set up tracing: {err}"))?;
    info!(profile = %config.profile, "starting letsdeploy control plane");

    let (server, core) = build_application(&config).await?;

    let shutdown = CancellationToken::new();
    let sync_task = spawn_sync(core, shutdown.clone());

    let result = server.serve().await;

    shutdown.cancel();
    let _ = sync_task.await;
    result
}
