// src/server/initialization.rs

//! First startup phase: build the shared state and the shutdown channel.

use super::context::ServerContext;
use crate::config::Config;
use crate::core::state::ServerState;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

pub fn setup(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    let state = ServerState::initialize(config, log_reload_handle)?;
    let (shutdown_tx, _) = broadcast::channel(1);

    info!(
        "Server state initialized: {} active partition(s), {} archive(s).",
        state.index.active_partition_count(),
        state.archive.list().len()
    );

    Ok(ServerContext {
        state,
        shutdown_tx,
        background_tasks: JoinSet::new(),
    })
}
