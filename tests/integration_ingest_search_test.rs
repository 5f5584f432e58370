// tests/integration_ingest_search_test.rs

//! End-to-end ingest: raw line -> parser chain -> buffer -> partitioned
//! index -> search/cache -> real-time push.

use loglens::core::cache::SearchCache;
use loglens::core::events::RecordEventBus;
use loglens::core::index::bucket::BucketType;
use loglens::core::index::fields::FieldRegistry;
use loglens::core::index::{IndexOptions, PartitionedIndex};
use loglens::core::ingest::buffer::LogBuffer;
use loglens::core::ingest::IngestPipeline;
use loglens::core::model::LogLevel;
use loglens::core::realtime::SubscriptionManager;
use loglens::core::redaction::RedactionSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    pipeline: Arc<IngestPipeline>,
    index: Arc<PartitionedIndex>,
    events: Arc<RecordEventBus>,
}

fn harness(dir: &TempDir, redaction: Arc<RedactionSet>) -> Harness {
    let events = Arc::new(RecordEventBus::new());
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
            Arc::new(SearchCache::new(100, 300_000, true)),
            events.clone(),
            None,
        )
        .unwrap(),
    );
    let buffer = Arc::new(LogBuffer::new(index.clone(), 1000, Duration::from_secs(30)));
    let pipeline = Arc::new(IngestPipeline::new(buffer, redaction, "[REDACTED]".into()));
    Harness {
        pipeline,
        index,
        events,
    }
}

#[tokio::test]
async fn test_ingest_and_search_nginx_line() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir, Arc::new(RedactionSet::default()));

    let line = r#"192.168.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 200 10"#;
    h.pipeline.ingest_line(line, "access.log").await;
    h.pipeline.buffer().flush().await;

    let results = h.index.search("GET", false, None, None);
    assert_eq!(results.len(), 1);
    let record = &results[0];
    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.metadata["method"], "GET");
    assert_eq!(record.metadata["status_code"], "200");
    assert_eq!(record.metadata["log_format"], "nginx_common");
    assert_eq!(record.source, "access.log");

    // The search signature is cached.
    assert_eq!(h.index.cache().stats().size, 1);
}

#[tokio::test]
async fn test_indexed_records_reach_subscribers() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir, Arc::new(RedactionSet::default()));
    let manager = Arc::new(SubscriptionManager::new(h.index.clone()));

    let (_id, mut rx) = manager.subscribe_logs("checkout", false, None, None);
    assert_eq!(rx.recv().await.unwrap().name(), "connected");
    assert_eq!(rx.recv().await.unwrap().name(), "initialData");

    // Bridge committed records into the manager the way the fan-out task does.
    let mut events_rx = h.events.subscribe();

    h.pipeline
        .ingest_line("checkout service crashed", "app.log")
        .await;
    h.pipeline.buffer().flush().await;

    let committed = events_rx.recv().await.unwrap();
    manager.on_record(&committed);

    let update = rx.recv().await.unwrap();
    assert_eq!(update.name(), "logUpdate");
    assert!(update.data_json().contains("checkout service crashed"));
}

#[tokio::test]
async fn test_redaction_applies_before_indexing() {
    let dir = TempDir::new().unwrap();
    let redaction = Arc::new(RedactionSet::new(&[], &[r"(password=)(\S+)".to_string()]));
    let h = harness(&dir, redaction);

    h.pipeline
        .ingest_line("login password=hunter2 accepted", "auth.log")
        .await;
    h.pipeline.buffer().flush().await;

    let results = h.index.search("login", false, None, None);
    assert_eq!(results.len(), 1);
    assert!(results[0].raw_content.contains("password=[REDACTED]"));
    assert!(!results[0].raw_content.contains("hunter2"));
}
