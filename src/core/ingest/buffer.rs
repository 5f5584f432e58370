// src/core/ingest/buffer.rs

//! The ingestion buffer: many producers append records, one flush at a time
//! hands them to the index in a batch. Reaching the size bound triggers an
//! inline flush; a periodic task covers the time bound. Flushes are
//! non-reentrant: a contended flush attempt is a no-op because the running
//! flush already covers the queued records.

use crate::core::index::PartitionedIndex;
use crate::core::model::LogRecord;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error};

pub struct LogBuffer {
    index: Arc<PartitionedIndex>,
    pending: Mutex<Vec<LogRecord>>,
    max_size: usize,
    flush_interval: Duration,
    flush_lock: AsyncMutex<()>,
}

impl LogBuffer {
    pub fn new(index: Arc<PartitionedIndex>, max_size: usize, flush_interval: Duration) -> Self {
        Self {
            index,
            pending: Mutex::new(Vec::new()),
            max_size: max_size.max(1),
            flush_interval,
            flush_lock: AsyncMutex::new(()),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn size(&self) -> usize {
        self.pending.lock().len()
    }

    /// Appends one record, flushing inline once the size bound is reached.
    pub async fn add(&self, record: LogRecord) {
        let should_flush = {
            let mut pending = self.pending.lock();
            pending.push(record);
            pending.len() >= self.max_size
        };
        if should_flush {
            self.flush().await;
        }
    }

    /// Bulk append; may trigger a flush mid-stream.
    pub async fn add_all(&self, records: Vec<LogRecord>) {
        for record in records {
            self.add(record).await;
        }
    }

    /// Indexes everything currently queued in one batch. Concurrent callers
    /// coalesce into the running flush and return immediately. Indexing
    /// failures are logged and the batch is dropped; re-queueing would grow
    /// without bound on persistent errors.
    pub async fn flush(&self) -> usize {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            return 0;
        };

        let batch = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending)
        };
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        match self.index.index_all(batch) {
            Ok(indexed) => {
                debug!("Buffer flushed {} record(s), {} indexed.", count, indexed);
                indexed
            }
            Err(e) => {
                error!("Buffer flush failed, dropping {} record(s): {}", count, e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::SearchCache;
    use crate::core::events::RecordEventBus;
    use crate::core::index::bucket::BucketType;
    use crate::core::index::fields::FieldRegistry;
    use crate::core::index::IndexOptions;
    use tempfile::TempDir;

    fn buffer(dir: &TempDir, max_size: usize) -> LogBuffer {
        let index = Arc::new(
            PartitionedIndex::open(
                IndexOptions {
                    base_dir: dir.path().to_path_buf(),
                    partitioning_enabled: true,
                    bucket_type: BucketType::Daily,
                    max_active_partitions: 7,
                    auto_archive: false,
                },
                Arc::new(FieldRegistry::default()),
                Arc::new(SearchCache::new(10, 60_000, true)),
                Arc::new(RecordEventBus::new()),
                None,
            )
            .unwrap(),
        );
        LogBuffer::new(index, max_size, Duration::from_secs(30))
    }

    fn record(n: usize) -> LogRecord {
        LogRecord::new(format!("message {n}"), "test.log", format!("raw {n}"))
    }

    #[tokio::test]
    async fn add_queues_until_flush() {
        let dir = TempDir::new().unwrap();
        let buf = buffer(&dir, 100);
        buf.add(record(1)).await;
        buf.add(record(2)).await;
        assert_eq!(buf.size(), 2);
        assert_eq!(buf.index.total_doc_count(), 0);

        assert_eq!(buf.flush().await, 2);
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.index.total_doc_count(), 2);
    }

    #[tokio::test]
    async fn size_bound_triggers_flush() {
        let dir = TempDir::new().unwrap();
        let buf = buffer(&dir, 3);
        for n in 0..3 {
            buf.add(record(n)).await;
        }
        assert_eq!(buf.size(), 0);
        assert_eq!(buf.index.total_doc_count(), 3);
    }

    #[tokio::test]
    async fn flush_of_empty_buffer_is_noop() {
        let dir = TempDir::new().unwrap();
        let buf = buffer(&dir, 10);
        assert_eq!(buf.flush().await, 0);
    }

    #[tokio::test]
    async fn add_all_crosses_threshold() {
        let dir = TempDir::new().unwrap();
        let buf = buffer(&dir, 2);
        buf.add_all((0..5).map(record).collect()).await;
        // Two full batches flushed; one record remains queued.
        assert_eq!(buf.index.total_doc_count(), 4);
        assert_eq!(buf.size(), 1);
    }
}
