// src/server/mod.rs

use crate::config::Config;
use crate::core::ingest::cloud::CloudLogClient;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

mod context;
mod http;
mod initialization;
mod spawner;

pub use context::ServerContext;
pub use http::router;

/// The main server startup function, orchestrating all setup phases.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    cloud_client: Option<Arc<dyn CloudLogClient>>,
) -> Result<()> {
    // 1. Initialize server state.
    let mut server_context = initialization::setup(config, log_reload_handle)?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context, cloud_client).await?;

    // 3. Serve the node API until interrupted.
    let state = server_context.state.clone();
    let shutdown_tx = server_context.shutdown_tx.clone();
    let serve_rx = shutdown_tx.subscribe();

    tokio::select! {
        result = http::serve(state, serve_rx) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received; shutting down.");
        }
    }

    // 4. Stop background tasks and wait for them to drain (the buffer
    // flusher performs its final flush here).
    let _ = shutdown_tx.send(());
    while server_context.background_tasks.join_next().await.is_some() {}
    info!("Shutdown complete.");
    Ok(())
}
