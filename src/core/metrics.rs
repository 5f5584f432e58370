// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};

lazy_static! {
    // --- Ingestion ---
    /// Total records produced by all sources since startup.
    pub static ref RECORDS_INGESTED_TOTAL: Counter =
        register_counter!("loglens_records_ingested_total", "Total log records ingested.").unwrap();
    /// Total records committed to the index since startup.
    pub static ref RECORDS_INDEXED_TOTAL: Counter =
        register_counter!("loglens_records_indexed_total", "Total log records indexed.").unwrap();
    /// Records currently queued in the ingestion buffer.
    pub static ref BUFFER_SIZE: Gauge =
        register_gauge!("loglens_buffer_size", "Records currently queued in the ingestion buffer.").unwrap();

    // --- Index ---
    /// The number of active partitions.
    pub static ref ACTIVE_PARTITIONS: Gauge =
        register_gauge!("loglens_active_partitions", "Number of active index partitions.").unwrap();
    /// Total documents across active partitions.
    pub static ref INDEXED_DOCUMENTS: Gauge =
        register_gauge!("loglens_indexed_documents", "Total documents across active partitions.").unwrap();

    // --- Search ---
    pub static ref SEARCHES_TOTAL: Counter =
        register_counter!("loglens_searches_total", "Total searches executed.").unwrap();
    /// Mirrors the search cache's internal hit counter.
    pub static ref SEARCH_CACHE_HITS: Gauge =
        register_gauge!("loglens_search_cache_hits", "Search cache hits since startup.").unwrap();
    pub static ref SEARCH_LATENCY_SECONDS: Histogram =
        register_histogram!("loglens_search_latency_seconds", "Latency of search execution in seconds.").unwrap();

    // --- Alarms ---
    pub static ref ALARMS_TRIGGERED_TOTAL: Counter =
        register_counter!("loglens_alarms_triggered_total", "Total alarm triggers.").unwrap();
    pub static ref NOTIFICATIONS_SENT_TOTAL: Counter =
        register_counter!("loglens_notifications_sent_total", "Total notifications dispatched.").unwrap();

    // --- Real-time ---
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge =
        register_gauge!("loglens_active_subscriptions", "Open real-time subscriptions.").unwrap();

    // --- Cluster ---
    pub static ref CLUSTER_NODES: Gauge =
        register_gauge!("loglens_cluster_nodes", "Known cluster nodes, including self.").unwrap();
    /// 1 when this node is the cluster leader.
    pub static ref IS_LEADER: Gauge =
        register_gauge!("loglens_is_leader", "Indicates whether this node is the cluster leader (1 for true, 0 for false).").unwrap();

    // --- System health ---
    pub static ref SYSTEM_CPU_USAGE: Gauge =
        register_gauge!("loglens_system_cpu_usage", "System CPU usage percentage.").unwrap();
    pub static ref SYSTEM_MEMORY_USAGE: Gauge =
        register_gauge!("loglens_system_memory_usage", "System memory usage percentage.").unwrap();
    pub static ref SYSTEM_DISK_USAGE: Gauge =
        register_gauge!("loglens_system_disk_usage", "Disk usage percentage of the index volume.").unwrap();
    /// 1 when every sampled metric is below its alarm threshold.
    pub static ref SYSTEM_HEALTHY: Gauge =
        register_gauge!("loglens_system_healthy", "Overall health status (1 healthy, 0 degraded).").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
