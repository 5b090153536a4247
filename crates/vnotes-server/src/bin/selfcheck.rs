use std::sync::Arc;

use vnotes_ai::ChatConfig;
use vnotes_engine_client::EngineClient;
use vnotes_firestore::{DocumentStore, FirestoreClient, MemoryStore};
use vnotes_server::{ServerConfig, StoreBackend};
use vnotes_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let config = ServerConfig::from_env();
    let worker = WorkerConfig::from_env()?;
    println!(
        "vnotes-selfcheck: store={} max_jobs={} chunk_size={} engine_timeout={:?}",
        config.store_backend.as_str(),
        worker.max_concurrent_jobs,
        worker.chunk_size,
        worker.engine_timeout
    );

    let store: Arc<dyn DocumentStore> = match config.store_backend {
        StoreBackend::Firestore => {
            ensure_env_present(&["GCP_PROJECT_ID"])?;
            Arc::new(FirestoreClient::from_env().await?)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    store
        .get("users", "__selfcheck__")
        .await
        .map_err(|e| anyhow::anyhow!("store probe failed: {}", e))?;
    println!("vnotes-selfcheck: store reachable");

    let engine = EngineClient::from_env()?;
    if engine.health_check().await {
        println!("vnotes-selfcheck: engine healthy");
    } else {
        println!("vnotes-selfcheck: warning: engine health check failed");
    }

    if ChatConfig::from_env().is_configured() {
        println!("vnotes-selfcheck: AI credential configured");
    } else {
        println!("vnotes-selfcheck: warning: OPENROUTER_API_KEY not set");
    }

    println!("vnotes-selfcheck: ok");
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
