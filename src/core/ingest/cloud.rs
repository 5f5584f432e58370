// src/core/ingest/cloud.rs

//! The cloud log-stream source. The provider API is abstracted behind
//! `CloudLogClient`; the fetcher task pages through each registered stream
//! once a minute with a per-stream cursor (last seen timestamp plus the
//! provider's continuation token). The cursor advances only on success, so
//! events behind a failed fetch are re-read at the next tick.

use super::IngestPipeline;
use super::coordinator::IngestionCoordinator;
use crate::core::errors::LogLensError;
use crate::core::model::{LogLevel, LogRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Fetch period for every registered stream.
pub const FETCH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct CloudEvent {
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloudBatch {
    pub events: Vec<CloudEvent>,
    pub next_token: Option<String>,
}

/// The provider seam: one page of events for a group/stream at or after
/// `from_timestamp`, optionally resumed from a continuation token.
#[async_trait]
pub trait CloudLogClient: Send + Sync {
    async fn fetch(
        &self,
        group: &str,
        stream: &str,
        from_timestamp: i64,
        token: Option<&str>,
    ) -> Result<CloudBatch, LogLensError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudStreamConfig {
    pub id: String,
    pub group: String,
    pub stream: String,
}

#[derive(Debug, Clone, Default)]
struct StreamCursor {
    last_timestamp: i64,
    token: Option<String>,
}

pub struct CloudFetcherTask {
    client: Arc<dyn CloudLogClient>,
    streams: Vec<CloudStreamConfig>,
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<IngestionCoordinator>,
    cursors: DashMap<String, StreamCursor>,
}

impl CloudFetcherTask {
    pub fn new(
        client: Arc<dyn CloudLogClient>,
        streams: Vec<CloudStreamConfig>,
        pipeline: Arc<IngestPipeline>,
        coordinator: Arc<IngestionCoordinator>,
    ) -> Self {
        Self {
            client,
            streams,
            pipeline,
            coordinator,
            cursors: DashMap::new(),
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Cloud log fetcher started for {} stream(s).",
            self.streams.len()
        );
        let mut interval = tokio::time::interval(FETCH_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.fetch_all().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Cloud log fetcher shutting down.");
                    return;
                }
            }
        }
    }

    async fn fetch_all(&self) {
        for stream in &self.streams {
            if !self.coordinator.should_process_source(&stream.id) {
                continue;
            }
            if let Err(e) = self.fetch_stream(stream).await {
                warn!(
                    "Cloud fetch failed for '{}/{}': {}. Cursor left untouched.",
                    stream.group, stream.stream, e
                );
            }
        }
    }

    async fn fetch_stream(&self, stream: &CloudStreamConfig) -> Result<(), LogLensError> {
        let cursor = self
            .cursors
            .get(&stream.id)
            .map(|c| c.clone())
            .unwrap_or_default();

        let batch = self
            .client
            .fetch(
                &stream.group,
                &stream.stream,
                cursor.last_timestamp,
                cursor.token.as_deref(),
            )
            .await?;

        let source = format!("cloud:{}/{}", stream.group, stream.stream);
        let mut max_ts = cursor.last_timestamp;
        let count = batch.events.len();
        for event in batch.events {
            let mut record =
                LogRecord::new(event.message.clone(), source.clone(), event.message);
            record.level = LogLevel::Unknown;
            record.record_time = Some(event.timestamp);
            record
                .metadata
                .insert("log_group".into(), stream.group.clone());
            record
                .metadata
                .insert("log_stream".into(), stream.stream.clone());
            self.pipeline.ingest_record(record).await;
            max_ts = max_ts.max(event.timestamp);
        }

        if count > 0 {
            debug!("Fetched {} cloud event(s) from '{}'.", count, source);
            // Advance past the newest delivered event.
            self.cursors.insert(
                stream.id.clone(),
                StreamCursor {
                    last_timestamp: max_ts + 1,
                    token: batch.next_token,
                },
            );
        } else if batch.next_token != cursor.token {
            self.cursors.insert(
                stream.id.clone(),
                StreamCursor {
                    last_timestamp: cursor.last_timestamp,
                    token: batch.next_token,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::SearchCache;
    use crate::core::events::RecordEventBus;
    use crate::core::index::bucket::BucketType;
    use crate::core::index::fields::FieldRegistry;
    use crate::core::index::{IndexOptions, PartitionedIndex};
    use crate::core::ingest::buffer::LogBuffer;
    use crate::core::redaction::RedactionSet;
    use parking_lot::Mutex;
    use tempfile::TempDir;

    struct ScriptedClient {
        responses: Mutex<Vec<Result<CloudBatch, LogLensError>>>,
        calls: Mutex<Vec<(i64, Option<String>)>>,
    }

    #[async_trait]
    impl CloudLogClient for ScriptedClient {
        async fn fetch(
            &self,
            _group: &str,
            _stream: &str,
            from_timestamp: i64,
            token: Option<&str>,
        ) -> Result<CloudBatch, LogLensError> {
            self.calls
                .lock()
                .push((from_timestamp, token.map(|t| t.to_string())));
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Ok(CloudBatch::default())
            } else {
                responses.remove(0)
            }
        }
    }

    fn task(
        dir: &TempDir,
        client: Arc<ScriptedClient>,
    ) -> (CloudFetcherTask, Arc<PartitionedIndex>) {
        let index = Arc::new(
            PartitionedIndex::open(
                IndexOptions {
                    base_dir: dir.path().to_path_buf(),
                    partitioning_enabled: false,
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
        let buffer = Arc::new(LogBuffer::new(index.clone(), 1000, Duration::from_secs(30)));
        let pipeline = Arc::new(IngestPipeline::new(
            buffer,
            Arc::new(RedactionSet::default()),
            "[REDACTED]".into(),
        ));
        let coordinator = Arc::new(IngestionCoordinator::new(false, "test".into(), 30_000));
        let streams = vec![CloudStreamConfig {
            id: "s1".into(),
            group: "grp".into(),
            stream: "strm".into(),
        }];
        (
            CloudFetcherTask::new(client, streams, pipeline, coordinator),
            index,
        )
    }

    fn event(ts: i64, msg: &str) -> CloudEvent {
        CloudEvent {
            timestamp: ts,
            message: msg.to_string(),
        }
    }

    #[tokio::test]
    async fn cursor_advances_only_on_success() {
        let client = Arc::new(ScriptedClient {
            responses: Mutex::new(vec![
                Ok(CloudBatch {
                    events: vec![event(100, "one"), event(200, "two")],
                    next_token: Some("tok-1".into()),
                }),
                Err(LogLensError::HttpClient("boom".into())),
                Ok(CloudBatch::default()),
            ]),
            calls: Mutex::new(Vec::new()),
        });
        let dir = TempDir::new().unwrap();
        let (task, index) = task(&dir, client.clone());

        task.fetch_all().await;
        task.pipeline.buffer().flush().await;
        assert_eq!(index.total_doc_count(), 2);

        // The failed fetch must not move the cursor.
        task.fetch_all().await;
        task.fetch_all().await;

        let calls = client.calls.lock();
        assert_eq!(calls[0], (0, None));
        assert_eq!(calls[1], (201, Some("tok-1".into())));
        assert_eq!(calls[2], (201, Some("tok-1".into())));
    }
}
