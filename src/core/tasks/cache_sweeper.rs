// src/core/tasks/cache_sweeper.rs

//! Removes expired search-cache entries on a fixed period, so entries that
//! are never re-read still get evicted.

use crate::core::cache::SearchCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

pub struct CacheSweeperTask {
    cache: Arc<SearchCache>,
    interval: Duration,
}

impl CacheSweeperTask {
    pub fn new(cache: Arc<SearchCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Search cache sweeper started (every {:?}).", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.cache.sweep_expired();
                }
                _ = shutdown_rx.recv() => {
                    info!("Search cache sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
