// src/core/state.rs

//! Defines the central `ServerState` struct, holding all shared server-wide
//! state. It is assembled once at startup and passed (behind an `Arc`) to
//! every background task and HTTP handler; component dependencies are wired
//! explicitly here rather than through globals.

use crate::config::Config;
use crate::core::alarm::engine::AlarmEngine;
use crate::core::alarm::notifier::DefaultNotifier;
use crate::core::alarm::AlarmStore;
use crate::core::cache::SearchCache;
use crate::core::cluster::{ClusterMembership, derive_node_id};
use crate::core::errors::LogLensError;
use crate::core::events::RecordEventBus;
use crate::core::index::fields::FieldRegistry;
use crate::core::index::{IndexOptions, PartitionedIndex};
use crate::core::ingest::buffer::LogBuffer;
use crate::core::ingest::coordinator::IngestionCoordinator;
use crate::core::ingest::IngestPipeline;
use crate::core::query::QueryEngine;
use crate::core::realtime::SubscriptionManager;
use crate::core::redaction::RedactionSet;
use crate::core::retention::archive::ArchiveStore;
use crate::core::retention::{RetentionManager, RetentionPolicy};
use crate::core::shard::ShardRouter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, reload};

/// The central struct holding all shared, server-wide state.
pub struct ServerState {
    /// The server's runtime configuration, behind a mutex so administrative
    /// surfaces can adjust it.
    pub config: Arc<Mutex<Config>>,
    /// This node's identity, configured or derived from the hostname.
    pub node_id: String,
    /// This node's externally reachable base URL.
    pub node_url: String,
    pub index: Arc<PartitionedIndex>,
    pub cache: Arc<SearchCache>,
    pub buffer: Arc<LogBuffer>,
    pub events: Arc<RecordEventBus>,
    pub pipeline: Arc<IngestPipeline>,
    pub coordinator: Arc<IngestionCoordinator>,
    pub redaction: Arc<RedactionSet>,
    pub alarms: Arc<AlarmStore>,
    pub alarm_engine: Arc<AlarmEngine>,
    pub query_engine: Arc<QueryEngine>,
    pub retention: Arc<RetentionManager>,
    pub archive: Arc<ArchiveStore>,
    pub realtime: Arc<SubscriptionManager>,
    pub router: Arc<ShardRouter>,
    /// Present when high availability is enabled.
    pub cluster: Option<Arc<ClusterMembership>>,
    /// A handle to the logging filter, allowing dynamic log level changes.
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}

impl ServerState {
    /// Initializes the entire server state from the given configuration.
    /// This is the main factory function for creating the server's shared
    /// context.
    pub fn initialize(
        config: Config,
        log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
    ) -> Result<Arc<ServerState>, LogLensError> {
        let node_id = derive_node_id(config.high_availability.node_id.as_deref());
        let node_url = config
            .high_availability
            .node_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", config.server.host, config.server.port));
        info!("Initializing node '{}' ({}).", node_id, node_url);

        let events = Arc::new(RecordEventBus::new());
        let cache = Arc::new(SearchCache::new(
            config.search_cache.max_size,
            config.search_cache.expiration_ms,
            config.search_cache.enabled,
        ));
        let archive = Arc::new(ArchiveStore::open(
            &config.archive.directory,
            config.archive.compression_level,
            config.archive.retention_days,
        )?);

        let auto_archive = config.index.auto_archive || config.archive.auto_archive_enabled;
        let index = Arc::new(PartitionedIndex::open(
            IndexOptions {
                base_dir: PathBuf::from(&config.index.base_dir),
                partitioning_enabled: config.index.partitioning_enabled,
                bucket_type: config.index.partition_type,
                max_active_partitions: config.index.max_active_partitions,
                auto_archive,
            },
            Arc::new(FieldRegistry::new(config.index.fields.clone())),
            cache.clone(),
            events.clone(),
            Some(archive.clone()),
        )?);

        let buffer = Arc::new(LogBuffer::new(
            index.clone(),
            config.buffer.max_size,
            Duration::from_millis(config.buffer.flush_interval_ms),
        ));

        let redaction = if config.redaction.enabled {
            Arc::new(RedactionSet::new(
                &config.redaction.keys,
                &config.redaction.patterns,
            ))
        } else {
            Arc::new(RedactionSet::default())
        };
        let pipeline = Arc::new(IngestPipeline::new(
            buffer.clone(),
            redaction.clone(),
            config.redaction.mask.clone(),
        ));

        let instance_id = config
            .horizontal_scaling
            .instance_id
            .clone()
            .unwrap_or_else(|| node_id.clone());
        let coordinator = Arc::new(IngestionCoordinator::new(
            config.horizontal_scaling.enabled,
            instance_id,
            config.horizontal_scaling.heartbeat_timeout_ms,
        ));

        let router = Arc::new(ShardRouter::new(
            config.sharding.enabled,
            node_id.clone(),
            config.sharding.sharding_type,
            config.sharding.number_of_shards,
            index.clone(),
            cache.clone(),
        ));
        router.register_node(&node_id, &node_url);

        let cluster = if config.high_availability.enabled {
            let seeds: Vec<(String, String)> = config
                .sharding
                .nodes
                .iter()
                .map(|n| (n.id.clone(), n.url.clone()))
                .collect();
            Some(Arc::new(ClusterMembership::new(
                node_id.clone(),
                node_url.clone(),
                Duration::from_millis(config.high_availability.heartbeat_interval_ms),
                Duration::from_millis(config.high_availability.leader_check_interval_ms),
                config.high_availability.heartbeat_timeout_ms,
                seeds,
                router.clone(),
            )))
        } else {
            // Without HA the statically configured shard nodes still join
            // the fan-out set.
            for node in &config.sharding.nodes {
                router.register_node(&node.id, &node.url);
            }
            None
        };

        let alarms = Arc::new(AlarmStore::new());
        let alarm_engine = Arc::new(AlarmEngine::new(
            alarms.clone(),
            index.clone(),
            Arc::new(DefaultNotifier::new()),
        ));
        let query_engine = Arc::new(QueryEngine::new(index.clone()));

        let policies: Vec<RetentionPolicy> = config
            .retention_policies
            .iter()
            .map(|p| {
                let mut policy = RetentionPolicy::new(p.name.clone(), p.max_age_days);
                policy.enabled = p.enabled;
                policy.apply_to_sources = p.apply_to_sources.clone();
                policy
            })
            .collect();
        let retention = Arc::new(RetentionManager::new(index.clone(), policies));

        let realtime = Arc::new(SubscriptionManager::new(index.clone()));

        Ok(Arc::new(ServerState {
            config: Arc::new(Mutex::new(config)),
            node_id,
            node_url,
            index,
            cache,
            buffer,
            events,
            pipeline,
            coordinator,
            redaction,
            alarms,
            alarm_engine,
            query_engine,
            retention,
            archive,
            realtime,
            router,
            cluster,
            log_reload_handle,
        }))
    }
}
