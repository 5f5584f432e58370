// src/core/events.rs

//! The event bus that propagates newly indexed records to the real-time
//! fan-out layer. Indexing publishes fire-and-forget; it is fine for no
//! subscriber to be listening.

use crate::core::model::LogRecord;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::trace;

/// The capacity of the broadcast channel for indexed-record events.
/// Large enough to absorb a burst of batch commits without lagging the
/// real-time layer.
const RECORD_BUS_CAPACITY: usize = 8192;

#[derive(Debug)]
pub struct RecordEventBus {
    sender: Sender<Arc<LogRecord>>,
}

impl Default for RecordEventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(RECORD_BUS_CAPACITY);
        Self { sender }
    }
}

impl RecordEventBus {
    pub fn new() -> Self {
        Default::default()
    }

    /// Publishes a committed record. Records are shared via `Arc` so a large
    /// subscriber set never clones the payload.
    pub fn publish(&self, record: Arc<LogRecord>) {
        if self.sender.send(record).is_err() {
            trace!("Indexed-record event published with no active subscribers.");
        }
    }

    pub fn subscribe(&self) -> Receiver<Arc<LogRecord>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
