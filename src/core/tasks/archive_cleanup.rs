// src/core/tasks/archive_cleanup.rs

//! Prunes expired cold archives once a day at 02:00 UTC.

use super::until_next;
use crate::core::retention::archive::ArchiveStore;
use chrono::NaiveTime;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct ArchiveCleanupTask {
    archive: Arc<ArchiveStore>,
}

impl ArchiveCleanupTask {
    pub fn new(archive: Arc<ArchiveStore>) -> Self {
        Self { archive }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let two_am = NaiveTime::from_hms_opt(2, 0, 0).expect("02:00");
        info!("Archive cleanup scheduled daily at 02:00 UTC.");
        loop {
            let wait = until_next(two_am);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.archive.cleanup_expired();
                }
                _ = shutdown_rx.recv() => {
                    info!("Archive cleanup shutting down.");
                    return;
                }
            }
        }
    }
}
