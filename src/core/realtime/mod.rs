// src/core/realtime/mod.rs

//! Real-time update fan-out. Clients subscribe with a selector (a log query
//! or a dashboard widget); each subscription owns a bounded sink the HTTP
//! layer drains into an SSE stream. New indexed records are matched against
//! every log selector; a heartbeat sweep keeps sinks alive, drops the dead,
//! and expires subscriptions past their deadline.

use crate::core::index::PartitionedIndex;
use crate::core::model::{LogRecord, now_millis};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};
use uuid::Uuid;

/// Keep-alive cadence for open subscriptions.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Soft TTL; an expired subscription is closed and the client reconnects.
const SUBSCRIPTION_TTL_MS: i64 = 5 * 60_000;
/// Per-subscription sink capacity. A subscriber that falls this far behind
/// is treated as dead.
const SINK_CAPACITY: usize = 256;
/// Cap on the initial snapshot pushed to a new log subscription.
const INITIAL_SNAPSHOT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Log,
    Widget,
}

/// One event on a subscription stream. `name()` is the SSE event name.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Connected { subscription_id: String },
    InitialData { records: Vec<LogRecord> },
    LogUpdate { record: Arc<LogRecord> },
    WidgetUpdate { dashboard_id: String, widget_id: String, payload: serde_json::Value },
    Heartbeat,
}

impl StreamEvent {
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::InitialData { .. } => "initialData",
            StreamEvent::LogUpdate { .. } => "logUpdate",
            StreamEvent::WidgetUpdate { .. } => "widgetUpdate",
            StreamEvent::Heartbeat => "heartbeat",
        }
    }

    pub fn data_json(&self) -> String {
        match self {
            StreamEvent::Connected { subscription_id } => {
                json!({ "subscriptionId": subscription_id }).to_string()
            }
            StreamEvent::InitialData { records } => {
                serde_json::to_string(records).unwrap_or_else(|_| "[]".into())
            }
            StreamEvent::LogUpdate { record } => {
                serde_json::to_string(record.as_ref()).unwrap_or_else(|_| "{}".into())
            }
            StreamEvent::WidgetUpdate { dashboard_id, widget_id, payload } => json!({
                "dashboardId": dashboard_id,
                "widgetId": widget_id,
                "data": payload,
            })
            .to_string(),
            StreamEvent::Heartbeat => json!({ "timestamp": now_millis() }).to_string(),
        }
    }
}

// Regex mode is accepted at subscribe time (it shapes the initial
// snapshot) but live matching is substring containment on the message.
enum Selector {
    Log { query: String },
    Widget { dashboard_id: String, widget_id: String },
}

struct Subscription {
    id: String,
    selector: Selector,
    sink: mpsc::Sender<StreamEvent>,
    deadline: i64,
}

impl Subscription {
    #[cfg(test)]
    fn kind(&self) -> SubscriptionKind {
        match self.selector {
            Selector::Log { .. } => SubscriptionKind::Log,
            Selector::Widget { .. } => SubscriptionKind::Widget,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeStats {
    pub total_connections: u64,
    pub active_connections: usize,
    pub log_update_connections: usize,
    pub widget_update_connections: usize,
    pub log_update_queries: Vec<String>,
    pub widget_update_subscriptions: Vec<String>,
}

pub struct SubscriptionManager {
    index: Arc<PartitionedIndex>,
    subscriptions: DashMap<String, Subscription>,
    total_connections: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(index: Arc<PartitionedIndex>) -> Self {
        Self {
            index,
            subscriptions: DashMap::new(),
            total_connections: AtomicU64::new(0),
        }
    }

    /// Opens a log subscription and pushes the connected + initial snapshot
    /// events. Returns the id and the event receiver.
    pub fn subscribe_logs(
        &self,
        query: &str,
        is_regex: bool,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> (String, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        let id = Uuid::new_v4().to_string();

        let _ = tx.try_send(StreamEvent::Connected {
            subscription_id: id.clone(),
        });

        // Best-effort snapshot of what already matches.
        let mut snapshot = self.index.search(query, is_regex, start_time, end_time);
        snapshot.truncate(INITIAL_SNAPSHOT_LIMIT);
        let _ = tx.try_send(StreamEvent::InitialData { records: snapshot });

        self.insert(Subscription {
            id: id.clone(),
            selector: Selector::Log {
                query: query.to_string(),
            },
            sink: tx,
            deadline: now_millis() + SUBSCRIPTION_TTL_MS,
        });
        (id, rx)
    }

    /// Opens a widget subscription with an initial empty payload.
    pub fn subscribe_widget(
        &self,
        dashboard_id: &str,
        widget_id: &str,
    ) -> (String, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        let id = Uuid::new_v4().to_string();

        let _ = tx.try_send(StreamEvent::Connected {
            subscription_id: id.clone(),
        });
        let _ = tx.try_send(StreamEvent::WidgetUpdate {
            dashboard_id: dashboard_id.to_string(),
            widget_id: widget_id.to_string(),
            payload: json!({}),
        });

        self.insert(Subscription {
            id: id.clone(),
            selector: Selector::Widget {
                dashboard_id: dashboard_id.to_string(),
                widget_id: widget_id.to_string(),
            },
            sink: tx,
            deadline: now_millis() + SUBSCRIPTION_TTL_MS,
        });
        (id, rx)
    }

    fn insert(&self, subscription: Subscription) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        debug!("Subscription {} opened.", subscription.id);
        self.subscriptions.insert(subscription.id.clone(), subscription);
    }

    pub fn unsubscribe(&self, id: &str) {
        if self.subscriptions.remove(id).is_some() {
            debug!("Subscription {} closed.", id);
        }
    }

    /// Matches a newly indexed record against every log selector. Selector
    /// semantics are substring containment of the query in the record
    /// message; the regex flag is carried on the subscription but matching
    /// stays substring.
    pub fn on_record(&self, record: &Arc<LogRecord>) {
        let mut dead = Vec::new();
        for entry in self.subscriptions.iter() {
            let Selector::Log { query } = &entry.selector else {
                continue;
            };
            if !query.is_empty() && !record.message.contains(query.as_str()) {
                continue;
            }
            if entry
                .sink
                .try_send(StreamEvent::LogUpdate {
                    record: record.clone(),
                })
                .is_err()
            {
                dead.push(entry.id.clone());
            }
        }
        for id in dead {
            self.unsubscribe(&id);
        }
    }

    /// Pushes a widget data update to every subscription bound to it.
    pub fn push_widget_update(
        &self,
        dashboard_id: &str,
        widget_id: &str,
        payload: serde_json::Value,
    ) {
        let mut dead = Vec::new();
        for entry in self.subscriptions.iter() {
            let Selector::Widget {
                dashboard_id: d,
                widget_id: w,
            } = &entry.selector
            else {
                continue;
            };
            if d != dashboard_id || w != widget_id {
                continue;
            }
            if entry
                .sink
                .try_send(StreamEvent::WidgetUpdate {
                    dashboard_id: dashboard_id.to_string(),
                    widget_id: widget_id.to_string(),
                    payload: payload.clone(),
                })
                .is_err()
            {
                dead.push(entry.id.clone());
            }
        }
        for id in dead {
            self.unsubscribe(&id);
        }
    }

    /// One heartbeat sweep: expire past-deadline subscriptions and drop any
    /// whose sink rejects the keep-alive.
    pub fn heartbeat_sweep(&self) {
        let now = now_millis();
        let mut dead = Vec::new();
        for entry in self.subscriptions.iter() {
            if entry.deadline <= now {
                dead.push(entry.id.clone());
                continue;
            }
            if entry.sink.try_send(StreamEvent::Heartbeat).is_err() {
                dead.push(entry.id.clone());
            }
        }
        for id in dead {
            self.unsubscribe(&id);
        }
    }

    pub fn stats(&self) -> RealtimeStats {
        let mut log_queries = Vec::new();
        let mut widget_subs = Vec::new();
        for entry in self.subscriptions.iter() {
            match &entry.selector {
                Selector::Log { query } => log_queries.push(query.clone()),
                Selector::Widget {
                    dashboard_id,
                    widget_id,
                } => widget_subs.push(format!("{dashboard_id}/{widget_id}")),
            }
        }
        log_queries.sort();
        widget_subs.sort();
        RealtimeStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.subscriptions.len(),
            log_update_connections: log_queries.len(),
            widget_update_connections: widget_subs.len(),
            log_update_queries: log_queries,
            widget_update_subscriptions: widget_subs,
        }
    }

    #[cfg(test)]
    fn subscription_kind(&self, id: &str) -> Option<SubscriptionKind> {
        self.subscriptions.get(id).map(|s| s.kind())
    }
}

/// Bridges the indexed-record event bus into the subscription registry and
/// drives the heartbeat sweep.
pub struct RealtimeFanoutTask {
    manager: Arc<SubscriptionManager>,
    events_rx: broadcast::Receiver<Arc<LogRecord>>,
}

impl RealtimeFanoutTask {
    pub fn new(
        manager: Arc<SubscriptionManager>,
        events_rx: broadcast::Receiver<Arc<LogRecord>>,
    ) -> Self {
        Self { manager, events_rx }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Real-time fan-out task started.");
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Ok(record) => self.manager.on_record(&record),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!("Real-time fan-out lagged; {} record(s) skipped.", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Record event bus closed; fan-out task exiting.");
                            return;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    self.manager.heartbeat_sweep();
                }
                _ = shutdown_rx.recv() => {
                    info!("Real-time fan-out task shutting down.");
                    return;
                }
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

    fn manager(dir: &TempDir) -> Arc<SubscriptionManager> {
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
        Arc::new(SubscriptionManager::new(index))
    }

    fn record(message: &str) -> Arc<LogRecord> {
        Arc::new(LogRecord::new(message, "app.log", message))
    }

    #[tokio::test]
    async fn log_subscription_receives_connected_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (id, mut rx) = m.subscribe_logs("ERROR", false, None, None);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.name(), "connected");
        assert!(first.data_json().contains(&id));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.name(), "initialData");
        assert_eq!(m.subscription_kind(&id), Some(SubscriptionKind::Log));
    }

    #[tokio::test]
    async fn matching_record_is_pushed() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_id, mut rx) = m.subscribe_logs("ERROR", false, None, None);
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        m.on_record(&record("an ERROR happened"));
        m.on_record(&record("all fine"));

        let update = rx.recv().await.unwrap();
        assert_eq!(update.name(), "logUpdate");
        assert!(update.data_json().contains("an ERROR happened"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_sink_is_removed_on_push() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_id, rx) = m.subscribe_logs("ERROR", false, None, None);
        drop(rx);

        m.on_record(&record("ERROR again"));
        assert_eq!(m.stats().active_connections, 0);
    }

    #[tokio::test]
    async fn heartbeat_reaches_widget_subscription() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_id, mut rx) = m.subscribe_widget("dash-1", "widget-9");
        assert_eq!(rx.recv().await.unwrap().name(), "connected");
        assert_eq!(rx.recv().await.unwrap().name(), "widgetUpdate");

        m.heartbeat_sweep();
        assert_eq!(rx.recv().await.unwrap().name(), "heartbeat");
    }

    #[tokio::test]
    async fn widget_update_routes_by_ids() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_a, mut rx_a) = m.subscribe_widget("dash-1", "w1");
        let (_b, mut rx_b) = m.subscribe_widget("dash-1", "w2");
        for rx in [&mut rx_a, &mut rx_b] {
            rx.recv().await.unwrap();
            rx.recv().await.unwrap();
        }

        m.push_widget_update("dash-1", "w1", json!({"count": 3}));
        let update = rx_a.recv().await.unwrap();
        assert!(update.data_json().contains("\"count\":3"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn stats_reflect_subscriptions() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let (_a, _rx_a) = m.subscribe_logs("one", false, None, None);
        let (_b, _rx_b) = m.subscribe_widget("d", "w");

        let stats = m.stats();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 2);
        assert_eq!(stats.log_update_connections, 1);
        assert_eq!(stats.widget_update_connections, 1);
        assert_eq!(stats.log_update_queries, vec!["one"]);
        assert_eq!(stats.widget_update_subscriptions, vec!["d/w"]);
    }
}
