// tests/integration_distributed_search_test.rs

//! Two-node distributed search: node A fans out over HTTP to node B's
//! shard endpoint and merges both result sets newest-first.

use loglens::config::Config;
use loglens::core::model::LogRecord;
use loglens::core::state::ServerState;
use loglens::server::router;
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::{filter::EnvFilter, reload};

fn state_for(dir: &TempDir, node_id: &str) -> Arc<ServerState> {
    let mut config = Config::default();
    config.index.base_dir = dir.path().join("index").display().to_string();
    config.archive.directory = dir.path().join("archive").display().to_string();
    config.sharding.enabled = true;
    config.high_availability.node_id = Some(node_id.to_string());

    let (_filter, handle) = reload::Layer::<EnvFilter, tracing_subscriber::Registry>::new(
        EnvFilter::new("info"),
    );
    ServerState::initialize(config, Arc::new(handle)).unwrap()
}

fn matching_records(node: &str, base_ts: i64) -> Vec<LogRecord> {
    (0..3)
        .map(|n| {
            let mut record = LogRecord::new(
                format!("deploy failed on {node} #{n}"),
                format!("{node}.log"),
                format!("raw deploy {node} {n}"),
            );
            record.record_time = Some(base_ts + n);
            record
        })
        .collect()
}

#[tokio::test]
async fn test_two_node_merge_sorted_descending() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let state_a = state_for(&dir_a, "node-a");
    let state_b = state_for(&dir_b, "node-b");

    state_a
        .index
        .index_all(matching_records("node-a", 1_000))
        .unwrap();
    state_b
        .index
        .index_all(matching_records("node-b", 2_000))
        .unwrap();

    // Serve node B's API on an ephemeral port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state_b.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    state_a
        .router
        .register_node("node-b", &format!("http://{addr}"));

    let results = state_a
        .router
        .distributed_search("deploy", false, None, None)
        .await;

    assert_eq!(results.len(), 6);
    let times: Vec<i64> = results.iter().map(|r| r.effective_time()).collect();
    assert!(times.windows(2).all(|w| w[0] >= w[1]), "sorted descending");
    assert_eq!(times[0], 2_002);

    // The merged result set is cached on node A.
    assert_eq!(state_a.cache.stats().size, 1);
    let again = state_a
        .router
        .distributed_search("deploy", false, None, None)
        .await;
    assert_eq!(again.len(), 6);
    assert!(state_a.cache.stats().hits >= 1);
}

#[tokio::test]
async fn test_unreachable_peer_contributes_empty() {
    let dir_a = TempDir::new().unwrap();
    let state_a = state_for(&dir_a, "node-a");
    state_a
        .index
        .index_all(matching_records("node-a", 1_000))
        .unwrap();

    // A peer that refuses connections contributes nothing.
    state_a
        .router
        .register_node("node-dead", "http://127.0.0.1:1");

    let results = state_a
        .router
        .distributed_search("deploy", false, None, None)
        .await;
    assert_eq!(results.len(), 3);
}
