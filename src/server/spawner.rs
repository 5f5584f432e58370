// src/server/spawner.rs

//! Spawns all of the server's long-running background tasks.

use super::context::ServerContext;
use crate::core::alarm::engine::{AlarmEvaluatorTask, GroupProcessorTask};
use crate::core::cluster::HeartbeatTask;
use crate::core::health::{HealthSamplerTask, HealthThresholds};
use crate::core::ingest::cloud::{CloudFetcherTask, CloudLogClient};
use crate::core::ingest::scanner::DirectoryScannerTask;
use crate::core::ingest::syslog_server::{
    SyslogListener, SyslogProtocol, TcpSyslogListener, UdpSyslogListener,
};
use crate::core::realtime::RealtimeFanoutTask;
use crate::core::tasks::{
    archive_cleanup::ArchiveCleanupTask, buffer_flusher::BufferFlusherTask,
    cache_sweeper::CacheSweeperTask, retention_enforcer::RetentionEnforcerTask,
};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Spawns all background tasks into the context's JoinSet. An optional
/// cloud client enables the cloud-stream fetcher; without one the
/// configured cloud streams are ignored.
pub async fn spawn_all(
    ctx: &mut ServerContext,
    cloud_client: Option<Arc<dyn CloudLogClient>>,
) -> Result<()> {
    let state = ctx.state.clone();
    let shutdown_tx = &ctx.shutdown_tx;
    let tasks = &mut ctx.background_tasks;
    let config = state.config.lock().await.clone();

    // --- Ingestion ---
    let flusher = BufferFlusherTask::new(state.buffer.clone());
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { flusher.run(rx).await });

    if !config.sources.directories.is_empty() {
        let scanner = DirectoryScannerTask::new(
            state.pipeline.clone(),
            state.coordinator.clone(),
            config
                .sources
                .directories
                .iter()
                .map(PathBuf::from)
                .collect(),
            Duration::from_millis(config.sources.scan_interval_ms),
            config.sources.pattern_recognition,
        );
        let rx = shutdown_tx.subscribe();
        tasks.spawn(async move { scanner.run(rx).await });
    }

    for listener_config in &config.sources.syslog {
        let listener: Box<dyn SyslogListener> = match listener_config.protocol {
            SyslogProtocol::Udp => Box::new(UdpSyslogListener::new(
                listener_config.port,
                state.pipeline.clone(),
                state.coordinator.clone(),
            )),
            SyslogProtocol::Tcp => Box::new(TcpSyslogListener::new(
                listener_config.port,
                state.pipeline.clone(),
                state.coordinator.clone(),
            )),
        };
        let rx = shutdown_tx.subscribe();
        tasks.spawn(async move { listener.run(rx).await });
    }

    if let Some(client) = cloud_client {
        if !config.sources.cloud.is_empty() {
            let fetcher = CloudFetcherTask::new(
                client,
                config.sources.cloud.clone(),
                state.pipeline.clone(),
                state.coordinator.clone(),
            );
            let rx = shutdown_tx.subscribe();
            tasks.spawn(async move { fetcher.run(rx).await });
        }
    } else if !config.sources.cloud.is_empty() {
        info!("Cloud streams configured but no cloud client available; skipping fetcher.");
    }

    // --- Search cache ---
    if config.search_cache.enabled {
        let sweeper = CacheSweeperTask::new(
            state.cache.clone(),
            Duration::from_millis(config.search_cache.cleanup_interval_ms),
        );
        let rx = shutdown_tx.subscribe();
        tasks.spawn(async move { sweeper.run(rx).await });
    }

    // --- Alarms ---
    let evaluator = AlarmEvaluatorTask::new(
        state.alarm_engine.clone(),
        Duration::from_secs(config.alarm.evaluation_interval_secs),
    );
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { evaluator.run(rx).await });

    let group_processor = GroupProcessorTask::new(
        state.alarm_engine.clone(),
        Duration::from_secs(config.alarm.grouping_interval_secs),
    );
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { group_processor.run(rx).await });

    // --- Retention & archive ---
    let enforcer = RetentionEnforcerTask::new(state.retention.clone());
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { enforcer.run(rx).await });

    let cleanup = ArchiveCleanupTask::new(state.archive.clone());
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { cleanup.run(rx).await });

    // --- Real-time fan-out ---
    let fanout = RealtimeFanoutTask::new(state.realtime.clone(), state.events.subscribe());
    let rx = shutdown_tx.subscribe();
    tasks.spawn(async move { fanout.run(rx).await });

    // --- System health ---
    if config.health.enabled {
        let sampler = HealthSamplerTask::new(
            state.buffer.clone(),
            state.alarms.clone(),
            HealthThresholds {
                cpu_percent: config.health.cpu_threshold,
                memory_percent: config.health.memory_threshold,
                disk_percent: config.health.disk_threshold,
            },
            Duration::from_secs(config.health.interval_secs),
        );
        let rx = shutdown_tx.subscribe();
        tasks.spawn(async move { sampler.run(rx).await });
    }

    // --- Cluster ---
    if let Some(membership) = &state.cluster {
        let heartbeat = HeartbeatTask::new(membership.clone());
        let rx = shutdown_tx.subscribe();
        tasks.spawn(async move { heartbeat.run(rx).await });
    }

    info!("All background tasks have been spawned.");
    Ok(())
}
