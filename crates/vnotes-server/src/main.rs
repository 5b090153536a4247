//! VidNotes service host.
//!
//! Wires the services, runs the background sweep, and drains in-flight
//! ingestion jobs on shutdown.

use tracing::{info, warn};

use vnotes_server::{telemetry, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    telemetry::init_tracing();
    info!("Starting vnotes-server");

    let config = ServerConfig::from_env();
    if let Some(addr) = config.metrics_addr {
        telemetry::init_metrics(addr)?;
        info!("Prometheus metrics exporter listening on {}", addr);
    }

    let state = AppState::from_env(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create application state: {}", e))?;

    let detector = state.stale_detector.clone();
    let shutdown_rx = state.supervisor.shutdown_signal();
    let sweep = tokio::spawn(async move {
        detector.run(shutdown_rx).await;
    });

    info!("vnotes-server ready");
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    if !state.shutdown().await {
        warn!("Some ingestion jobs were still running at shutdown");
    }
    sweep.await.ok();

    info!("Server shutdown complete");
    Ok(())
}
