// src/server/context.rs

use crate::core::state::ServerState;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Everything the running server needs: the shared state, the shutdown
/// signal, and the set of spawned background tasks.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<()>,
}
