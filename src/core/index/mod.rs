// src/core/index/mod.rs

//! The partitioned full-text index. Records land in the partition whose
//! calendar bucket contains their timestamp (falling back to the current
//! partition), searches fan out across every active partition, and rotation
//! keeps the active set bounded, archiving what falls off the end.

pub mod bucket;
pub mod fields;
pub mod partition;
pub mod text_query;

use crate::core::cache::{CacheKey, SearchCache};
use crate::core::errors::LogLensError;
use crate::core::events::RecordEventBus;
use crate::core::model::{LogRecord, now_millis};
use crate::core::retention::archive::ArchiveStore;
use bucket::BucketType;
use fields::FieldRegistry;
use parking_lot::RwLock;
use partition::Partition;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-partition result cap for searches and term lookups.
const SEARCH_CAP_PER_PARTITION: usize = 1000;
/// Per-partition collection cap for retention deletes.
const DELETE_CAP_PER_PARTITION: usize = 10_000;
/// Name of the single partition used when partitioning is disabled.
const LEGACY_PARTITION: &str = "main";

/// Construction-time settings, resolved from the configuration file.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub base_dir: PathBuf,
    pub partitioning_enabled: bool,
    pub bucket_type: BucketType,
    pub max_active_partitions: usize,
    pub auto_archive: bool,
}

pub struct PartitionedIndex {
    options: IndexOptions,
    fields: Arc<FieldRegistry>,
    /// Active partitions, newest first.
    partitions: RwLock<Vec<Arc<Partition>>>,
    cache: Arc<SearchCache>,
    events: Arc<RecordEventBus>,
    archive: Option<Arc<ArchiveStore>>,
}

impl PartitionedIndex {
    /// Opens the index, replaying every partition directory found under the
    /// base dir. Partitions that fail to open are skipped with an error log
    /// so one damaged partition cannot take the whole index down.
    pub fn open(
        options: IndexOptions,
        fields: Arc<FieldRegistry>,
        cache: Arc<SearchCache>,
        events: Arc<RecordEventBus>,
        archive: Option<Arc<ArchiveStore>>,
    ) -> Result<Self, LogLensError> {
        fs::create_dir_all(&options.base_dir)?;

        let mut partitions: Vec<Arc<Partition>> = Vec::new();
        if options.partitioning_enabled {
            for entry in fs::read_dir(&options.base_dir)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let Some(label) = name.strip_prefix("partition_") else {
                    continue;
                };
                match Partition::open(&options.base_dir, &name, label, fields.clone()) {
                    Ok(p) => partitions.push(Arc::new(p)),
                    Err(e) => error!("Failed to open partition '{}': {}. Skipping.", name, e),
                }
            }
            partitions.sort_by(|a, b| b.label.cmp(&a.label));
        } else {
            let legacy = Partition::open(&options.base_dir, LEGACY_PARTITION, "", fields.clone())?;
            partitions.push(Arc::new(legacy));
        }

        info!(
            "Index opened with {} active partition(s) under {}.",
            partitions.len(),
            options.base_dir.display()
        );

        Ok(Self {
            options,
            fields,
            partitions: RwLock::new(partitions),
            cache,
            events,
            archive,
        })
    }

    pub fn cache(&self) -> Arc<SearchCache> {
        self.cache.clone()
    }

    fn snapshot(&self) -> Vec<Arc<Partition>> {
        self.partitions.read().clone()
    }

    /// Ensures the current calendar bucket has an active partition and
    /// bounds the active set, closing (and optionally archiving) the oldest.
    pub fn check_and_rotate(&self) -> Result<(), LogLensError> {
        if !self.options.partitioning_enabled {
            return Ok(());
        }

        let label = self.options.bucket_type.label_for(now_millis());
        if !self.partitions.read().iter().any(|p| p.label == label) {
            let mut partitions = self.partitions.write();
            // Re-check under the write lock; another ingest path may have
            // created the bucket in between.
            if !partitions.iter().any(|p| p.label == label) {
                let name = format!("partition_{label}");
                let partition = Arc::new(Partition::open(
                    &self.options.base_dir,
                    &name,
                    &label,
                    self.fields.clone(),
                )?);
                info!("Opened new active partition '{}'.", name);
                partitions.insert(0, partition);
            }
        }

        loop {
            let evicted = {
                let mut partitions = self.partitions.write();
                if partitions.len() <= self.options.max_active_partitions.max(1) {
                    break;
                }
                partitions.pop()
            };
            if let Some(old) = evicted {
                self.retire_partition(old);
            }
        }
        Ok(())
    }

    fn retire_partition(&self, partition: Arc<Partition>) {
        info!(
            "Rotating out partition '{}' ({} records).",
            partition.name,
            partition.doc_count()
        );
        if self.options.auto_archive
            && let Some(archive) = &self.archive
        {
            let records = partition.all_records();
            if !records.is_empty()
                && let Err(e) = archive.archive_records(&records)
            {
                warn!(
                    "Failed to archive rotated partition '{}': {}. Proceeding with removal.",
                    partition.name, e
                );
            }
        }
        if let Err(e) = partition.destroy() {
            error!("Failed to remove partition '{}' files: {}", partition.name, e);
        }
    }

    /// Indexes a batch: groups records by target partition, commits each
    /// group, and broadcasts committed records to the real-time layer.
    /// A failing partition is logged and skipped; the rest of the batch
    /// still lands.
    pub fn index_all(&self, records: Vec<LogRecord>) -> Result<usize, LogLensError> {
        if records.is_empty() {
            return Ok(0);
        }
        self.check_and_rotate()?;

        let partitions = self.snapshot();
        let current = partitions
            .first()
            .cloned()
            .ok_or_else(|| LogLensError::Index("no active partition".into()))?;

        let mut groups: HashMap<String, (Arc<Partition>, Vec<LogRecord>)> = HashMap::new();
        for record in records {
            let target = self
                .partition_for_time(&partitions, record.effective_time())
                .unwrap_or_else(|| current.clone());
            groups
                .entry(target.name.clone())
                .or_insert_with(|| (target, Vec::new()))
                .1
                .push(record);
        }

        let mut indexed = 0;
        for (name, (partition, group)) in groups {
            for record in group {
                partition.stage(record);
            }
            match partition.commit() {
                Ok(committed) => {
                    indexed += committed.len();
                    for record in committed {
                        self.events.publish(Arc::new(record));
                    }
                }
                Err(e) => error!("Failed to commit batch to partition '{}': {}", name, e),
            }
        }
        Ok(indexed)
    }

    fn partition_for_time(
        &self,
        partitions: &[Arc<Partition>],
        ts: i64,
    ) -> Option<Arc<Partition>> {
        if !self.options.partitioning_enabled {
            return partitions.first().cloned();
        }
        let label = self.options.bucket_type.label_for(ts);
        partitions.iter().find(|p| p.label == label).cloned()
    }

    /// The core search path: cache consult, per-partition execution with the
    /// 1000-doc cap, union of results, cache populate.
    pub fn search(
        &self,
        query: &str,
        is_regex: bool,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Vec<LogRecord> {
        let built = text_query::SearchQuery::build(query, is_regex, start_time, end_time);
        if built.is_vacuous() {
            return Vec::new();
        }

        let key = CacheKey::new(query, is_regex, start_time, end_time);
        if let Some(cached) = self.cache.get(&key) {
            return cached.as_ref().clone();
        }

        let mut results = Vec::new();
        for partition in self.snapshot() {
            results.extend(partition.search(&built, SEARCH_CAP_PER_PARTITION));
        }

        self.cache.put(key, results.clone());
        results
    }

    pub fn find_by_level(&self, level: &str) -> Vec<LogRecord> {
        let mut results = Vec::new();
        for partition in self.snapshot() {
            results.extend(partition.find_by_level(level, SEARCH_CAP_PER_PARTITION));
        }
        results
    }

    pub fn find_by_source(&self, source: &str) -> Vec<LogRecord> {
        let mut results = Vec::new();
        for partition in self.snapshot() {
            results.extend(partition.find_by_source(source, SEARCH_CAP_PER_PARTITION));
        }
        results
    }

    pub fn find_by_metadata(&self, key: &str, value: &str) -> Vec<LogRecord> {
        let mut results = Vec::new();
        for partition in self.snapshot() {
            results.extend(partition.find_by_metadata(key, value, SEARCH_CAP_PER_PARTITION));
        }
        results
    }

    pub fn find_by_id(&self, id: &str) -> Option<LogRecord> {
        self.snapshot().iter().find_map(|p| p.find_by_id(id))
    }

    /// Deletes records older than `threshold` (optionally per source) from
    /// every partition, archiving the removed set first when configured.
    /// Archive failure never blocks the deletion.
    pub fn delete_older_than(
        &self,
        threshold: i64,
        source: Option<&str>,
    ) -> Result<usize, LogLensError> {
        let mut removed_total: Vec<LogRecord> = Vec::new();
        for partition in self.snapshot() {
            match partition.delete_older_than(threshold, source, DELETE_CAP_PER_PARTITION) {
                Ok(removed) => removed_total.extend(removed),
                Err(e) => error!(
                    "Failed to delete from partition '{}': {}. Continuing.",
                    partition.name, e
                ),
            }
        }

        if !removed_total.is_empty() {
            if self.options.auto_archive
                && let Some(archive) = &self.archive
                && let Err(e) = archive.archive_records(&removed_total)
            {
                warn!("Failed to archive {} deleted records: {}", removed_total.len(), e);
            }
            self.cache.invalidate_all();
        }
        Ok(removed_total.len())
    }

    pub fn active_partition_labels(&self) -> Vec<String> {
        self.partitions.read().iter().map(|p| p.label.clone()).collect()
    }

    pub fn active_partition_count(&self) -> usize {
        self.partitions.read().len()
    }

    pub fn total_doc_count(&self) -> usize {
        self.snapshot().iter().map(|p| p.doc_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_index(dir: &TempDir, max_active: usize) -> PartitionedIndex {
        PartitionedIndex::open(
            IndexOptions {
                base_dir: dir.path().to_path_buf(),
                partitioning_enabled: true,
                bucket_type: BucketType::Daily,
                max_active_partitions: max_active,
                auto_archive: false,
            },
            Arc::new(FieldRegistry::default()),
            Arc::new(SearchCache::new(100, 300_000, true)),
            Arc::new(RecordEventBus::new()),
            None,
        )
        .unwrap()
    }

    fn record(message: &str, raw: &str) -> LogRecord {
        LogRecord::new(message, "access.log", raw)
    }

    #[test]
    fn indexed_record_is_searchable_by_id() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        let r = record("GET /a 200", "raw-1");
        let id = r.id.clone();
        index.index_all(vec![r]).unwrap();

        let found = index.find_by_id(&id).unwrap();
        assert_eq!(found.id, id);
        assert_eq!(index.search("GET", false, None, None).len(), 1);
    }

    #[test]
    fn search_populates_cache() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        index.index_all(vec![record("GET /a 200", "raw-1")]).unwrap();

        index.search("GET", false, None, None);
        let stats = index.cache().stats();
        assert_eq!(stats.size, 1);

        // Second identical search hits the cache.
        index.search("GET", false, None, None);
        assert_eq!(index.cache().stats().hits, 1);
    }

    #[test]
    fn vacuous_search_is_empty() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        index.index_all(vec![record("hello", "raw-1")]).unwrap();
        assert!(index.search("", false, None, None).is_empty());
        assert!(index.search("^", false, None, None).is_empty());
    }

    #[test]
    fn current_bucket_partition_is_created_on_ingest() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        index.index_all(vec![record("hello", "raw-1")]).unwrap();

        let label = BucketType::Daily.label_for(now_millis());
        assert!(index.active_partition_labels().contains(&label));
    }

    #[test]
    fn out_of_bucket_record_routes_to_current_partition() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        let mut stale = record("ancient", "raw-old");
        stale.record_time = Some(1_000_000_000_000); // 2001, bucket not active
        index.index_all(vec![stale]).unwrap();

        assert_eq!(index.active_partition_count(), 1);
        assert_eq!(index.total_doc_count(), 1);
    }

    #[test]
    fn delete_older_than_removes_and_reports() {
        let dir = TempDir::new().unwrap();
        let index = open_index(&dir, 7);
        let mut old = record("old", "raw-old");
        old.ingest_time = 1_000;
        index.index_all(vec![old, record("fresh", "raw-new")]).unwrap();

        let removed = index.delete_older_than(2_000, None).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(index.total_doc_count(), 1);
        assert!(index.search("old", false, None, None).is_empty());
    }
}
