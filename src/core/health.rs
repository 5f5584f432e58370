// src/core/health.rs

//! System health sampling. Every cycle reads CPU, memory, and disk usage,
//! publishes them as metrics, and on a threshold breach emits a synthetic
//! health record into the ingestion buffer. The four predefined health
//! alarms match those records, so breaches ride the standard alarm
//! evaluation, throttling, grouping, and dispatch path.

use crate::core::alarm::{Alarm, AlarmStore};
use crate::core::ingest::buffer::LogBuffer;
use crate::core::metrics;
use crate::core::model::{LogLevel, LogRecord};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Disks, System};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Source tag for synthetic health records and the default grouping key of
/// the predefined alarms.
pub const HEALTH_SOURCE: &str = "system-health";
const HEALTH_GROUPING_WINDOW_MINUTES: u32 = 5;

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 90.0,
            memory_percent: 90.0,
            disk_percent: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HealthSample {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub healthy: bool,
}

pub struct HealthSamplerTask {
    buffer: Arc<LogBuffer>,
    store: Arc<AlarmStore>,
    thresholds: HealthThresholds,
    interval: Duration,
    system: System,
    disks: Disks,
}

impl HealthSamplerTask {
    pub fn new(
        buffer: Arc<LogBuffer>,
        store: Arc<AlarmStore>,
        thresholds: HealthThresholds,
        interval: Duration,
    ) -> Self {
        Self {
            buffer,
            store,
            thresholds,
            interval,
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
        }
    }

    /// Creates or updates the predefined health alarms.
    pub fn ensure_predefined_alarms(&self) {
        let definitions = [
            ("System CPU Usage Alert", "CPU usage"),
            ("System Memory Usage Alert", "memory usage"),
            ("System Disk Usage Alert", "disk usage"),
            ("System Health Check Alert", "health degraded"),
        ];
        for (name, query) in definitions {
            let mut alarm = Alarm::new(name, query, "count > 0", 0, HEALTH_GROUPING_WINDOW_MINUTES);
            alarm.description = format!("Predefined system health alarm ({query}).");
            alarm.grouping_key = Some(HEALTH_SOURCE.to_string());
            alarm.grouping_window_minutes = Some(HEALTH_GROUPING_WINDOW_MINUTES);
            if let Err(e) = self.store.upsert_by_name(alarm) {
                warn!("Failed to maintain predefined alarm '{}': {}", name, e);
            }
        }
    }

    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("System health sampler started (every {:?}).", self.interval);
        self.ensure_predefined_alarms();
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let sample = self.sample();
                    self.report(sample).await;
                }
                _ = shutdown_rx.recv() => {
                    info!("System health sampler shutting down.");
                    return;
                }
            }
        }
    }

    fn sample(&mut self) -> HealthSample {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.disks.refresh(true);

        let cpu_percent = f64::from(self.system.global_cpu_usage());

        let total_memory = self.system.total_memory();
        let memory_percent = if total_memory == 0 {
            0.0
        } else {
            self.system.used_memory() as f64 / total_memory as f64 * 100.0
        };

        let (total_disk, available_disk) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(total, avail), disk| {
                (total + disk.total_space(), avail + disk.available_space())
            });
        let disk_percent = if total_disk == 0 {
            0.0
        } else {
            (total_disk - available_disk) as f64 / total_disk as f64 * 100.0
        };

        let healthy = cpu_percent < self.thresholds.cpu_percent
            && memory_percent < self.thresholds.memory_percent
            && disk_percent < self.thresholds.disk_percent;

        HealthSample {
            cpu_percent,
            memory_percent,
            disk_percent,
            healthy,
        }
    }

    async fn report(&self, sample: HealthSample) {
        metrics::SYSTEM_CPU_USAGE.set(sample.cpu_percent);
        metrics::SYSTEM_MEMORY_USAGE.set(sample.memory_percent);
        metrics::SYSTEM_DISK_USAGE.set(sample.disk_percent);
        metrics::SYSTEM_HEALTHY.set(if sample.healthy { 1.0 } else { 0.0 });

        if sample.cpu_percent >= self.thresholds.cpu_percent {
            self.emit_breach(format!(
                "CPU usage at {:.1}% exceeds threshold {:.1}%",
                sample.cpu_percent, self.thresholds.cpu_percent
            ))
            .await;
        }
        if sample.memory_percent >= self.thresholds.memory_percent {
            self.emit_breach(format!(
                "memory usage at {:.1}% exceeds threshold {:.1}%",
                sample.memory_percent, self.thresholds.memory_percent
            ))
            .await;
        }
        if sample.disk_percent >= self.thresholds.disk_percent {
            self.emit_breach(format!(
                "disk usage at {:.1}% exceeds threshold {:.1}%",
                sample.disk_percent, self.thresholds.disk_percent
            ))
            .await;
        }
        if !sample.healthy {
            self.emit_breach("health degraded: one or more resources above threshold".into())
                .await;
        }
    }

    async fn emit_breach(&self, message: String) {
        warn!("System health breach: {}", message);
        let mut record = LogRecord::new(message.clone(), HEALTH_SOURCE, message);
        record.level = LogLevel::Warn;
        record
            .metadata
            .insert("log_format".into(), "health_check".into());
        self.buffer.add(record).await;
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
    use tempfile::TempDir;

    fn sampler(dir: &TempDir, thresholds: HealthThresholds) -> (HealthSamplerTask, Arc<PartitionedIndex>) {
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
        let buffer = Arc::new(LogBuffer::new(index.clone(), 1000, Duration::from_secs(30)));
        let task = HealthSamplerTask::new(
            buffer,
            Arc::new(AlarmStore::new()),
            thresholds,
            Duration::from_secs(60),
        );
        (task, index)
    }

    #[test]
    fn predefined_alarms_are_upserted_idempotently() {
        let dir = TempDir::new().unwrap();
        let (task, _index) = sampler(&dir, HealthThresholds::default());
        task.ensure_predefined_alarms();
        task.ensure_predefined_alarms();

        let alarms = task.store.list();
        assert_eq!(alarms.len(), 4);
        for alarm in alarms {
            assert_eq!(alarm.grouping_key.as_deref(), Some(HEALTH_SOURCE));
            assert_eq!(alarm.grouping_window_minutes, Some(5));
        }
    }

    #[tokio::test]
    async fn breach_emits_health_record() {
        let dir = TempDir::new().unwrap();
        // Impossible thresholds: everything is a breach.
        let (task, index) = sampler(
            &dir,
            HealthThresholds {
                cpu_percent: 0.0,
                memory_percent: 0.0,
                disk_percent: 0.0,
            },
        );
        let sample = HealthSample {
            cpu_percent: 55.0,
            memory_percent: 60.0,
            disk_percent: 70.0,
            healthy: false,
        };
        task.report(sample).await;
        task.buffer.flush().await;

        let records = index.find_by_source(HEALTH_SOURCE);
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.level == LogLevel::Warn));
    }

    #[test]
    fn sample_reports_plausible_percentages() {
        let dir = TempDir::new().unwrap();
        let (mut task, _index) = sampler(&dir, HealthThresholds::default());
        let sample = task.sample();
        assert!((0.0..=100.0).contains(&sample.memory_percent));
        assert!((0.0..=100.0).contains(&sample.disk_percent));
    }
}
