// src/core/tasks/buffer_flusher.rs

//! Periodic buffer flush. The size bound triggers flushes inline on the
//! producer path; this task covers the time bound and performs the final
//! best-effort flush on shutdown.

use crate::core::ingest::buffer::LogBuffer;
use crate::core::metrics;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct BufferFlusherTask {
    buffer: Arc<LogBuffer>,
}

impl BufferFlusherTask {
    pub fn new(buffer: Arc<LogBuffer>) -> Self {
        Self { buffer }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Buffer flusher started (every {:?}).",
            self.buffer.flush_interval()
        );
        let mut interval = tokio::time::interval(self.buffer.flush_interval());
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    metrics::BUFFER_SIZE.set(self.buffer.size() as f64);
                    let flushed = self.buffer.flush().await;
                    if flushed > 0 {
                        metrics::RECORDS_INDEXED_TOTAL.inc_by(flushed as f64);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Buffer flusher shutting down; flushing remaining records.");
                    self.buffer.flush().await;
                    return;
                }
            }
        }
    }
}
