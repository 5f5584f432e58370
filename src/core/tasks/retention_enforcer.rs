// src/core/tasks/retention_enforcer.rs

//! Applies every enabled retention policy once a day at midnight UTC.

use super::until_next;
use crate::core::retention::RetentionManager;
use chrono::NaiveTime;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct RetentionEnforcerTask {
    retention: Arc<RetentionManager>,
}

impl RetentionEnforcerTask {
    pub fn new(retention: Arc<RetentionManager>) -> Self {
        Self { retention }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let midnight = NaiveTime::from_hms_opt(0, 0, 0).expect("midnight");
        info!("Retention enforcer scheduled daily at 00:00 UTC.");
        loop {
            let wait = until_next(midnight);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    let deleted = self.retention.apply_all();
                    info!("Retention run complete; {} record(s) deleted.", deleted);
                }
                _ = shutdown_rx.recv() => {
                    info!("Retention enforcer shutting down.");
                    return;
                }
            }
        }
    }
}
