// src/core/ingest/scanner.rs

//! The directory scanner source: a periodic walk over configured
//! directories that tails every regular file into the ingestion pipeline.
//! Byte offsets are tracked per file so only appended content is re-read;
//! a truncated file is picked up again from the start.

use super::IngestPipeline;
use super::coordinator::IngestionCoordinator;
use dashmap::DashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct DirectoryScannerTask {
    pipeline: Arc<IngestPipeline>,
    coordinator: Arc<IngestionCoordinator>,
    directories: Vec<PathBuf>,
    scan_interval: Duration,
    pattern_recognition: bool,
    offsets: DashMap<PathBuf, u64>,
}

impl DirectoryScannerTask {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        coordinator: Arc<IngestionCoordinator>,
        directories: Vec<PathBuf>,
        scan_interval: Duration,
        pattern_recognition: bool,
    ) -> Self {
        Self {
            pipeline,
            coordinator,
            directories,
            scan_interval,
            pattern_recognition,
            offsets: DashMap::new(),
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Directory scanner started over {} director(ies).",
            self.directories.len()
        );
        let mut interval = tokio::time::interval(self.scan_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scan_all().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Directory scanner shutting down.");
                    return;
                }
            }
        }
    }

    async fn scan_all(&self) {
        for dir in &self.directories {
            let source_id = format!("dir:{}", dir.display());
            if !self.coordinator.should_process_source(&source_id) {
                continue;
            }
            if let Err(e) = self.scan_directory(dir).await {
                warn!("Failed to scan '{}': {}", dir.display(), e);
            }
        }
    }

    async fn scan_directory(&self, dir: &Path) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if let Err(e) = self.tail_file(&path).await {
                warn!("Failed to read '{}': {}", path.display(), e);
            }
        }
        Ok(())
    }

    async fn tail_file(&self, path: &Path) -> std::io::Result<()> {
        let len = std::fs::metadata(path)?.len();
        let mut offset = self.offsets.get(path).map(|o| *o).unwrap_or(0);
        if len < offset {
            debug!("File '{}' was truncated; re-reading.", path.display());
            offset = 0;
        }
        if len == offset {
            return Ok(());
        }

        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let mut reader = BufReader::new(File::open(path)?);
        reader.seek(SeekFrom::Start(offset))?;

        let mut consumed = offset;
        let mut line = String::new();
        let mut patterns: std::collections::HashMap<(String, String), usize> =
            std::collections::HashMap::new();
        loop {
            line.clear();
            let n = reader.read_line(&mut line)?;
            if n == 0 {
                break;
            }
            // Hold back a partial trailing line for the next pass.
            if !line.ends_with('\n') {
                break;
            }
            consumed += n as u64;
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            let record = self.pipeline.parse(trimmed, &source);
            if self.pattern_recognition {
                let format = record
                    .metadata
                    .get("log_format")
                    .cloned()
                    .unwrap_or_else(|| "unstructured".into());
                *patterns
                    .entry((format, record.level.to_string()))
                    .or_default() += 1;
            }
            self.pipeline.ingest_record(record).await;
        }
        self.offsets.insert(path.to_path_buf(), consumed);

        if self.pattern_recognition && !patterns.is_empty() {
            let mut summary: Vec<String> = patterns
                .into_iter()
                .map(|((format, level), count)| format!("{format}/{level}={count}"))
                .collect();
            summary.sort();
            info!("Patterns in '{}': {}", source, summary.join(", "));
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
    use std::io::Write;
    use tempfile::TempDir;

    fn scanner(index_dir: &TempDir, watch: &TempDir) -> (DirectoryScannerTask, Arc<PartitionedIndex>) {
        let index = Arc::new(
            PartitionedIndex::open(
                IndexOptions {
                    base_dir: index_dir.path().to_path_buf(),
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
        let pipeline = Arc::new(IngestPipeline::new(
            buffer,
            Arc::new(RedactionSet::default()),
            "[REDACTED]".into(),
        ));
        let coordinator = Arc::new(IngestionCoordinator::new(false, "test".into(), 30_000));
        let task = DirectoryScannerTask::new(
            pipeline,
            coordinator,
            vec![watch.path().to_path_buf()],
            Duration::from_secs(60),
            false,
        );
        (task, index)
    }

    #[tokio::test]
    async fn only_new_lines_are_ingested_on_rescan() {
        let index_dir = TempDir::new().unwrap();
        let watch = TempDir::new().unwrap();
        let (task, index) = scanner(&index_dir, &watch);

        let file = watch.path().join("app.log");
        std::fs::write(&file, "first line\nsecond line\n").unwrap();
        task.scan_all().await;
        task.pipeline.buffer().flush().await;
        assert_eq!(index.total_doc_count(), 2);

        let mut f = std::fs::OpenOptions::new().append(true).open(&file).unwrap();
        writeln!(f, "third line").unwrap();
        drop(f);
        task.scan_all().await;
        task.pipeline.buffer().flush().await;
        assert_eq!(index.total_doc_count(), 3);
    }

    #[tokio::test]
    async fn partial_trailing_line_is_held_back() {
        let index_dir = TempDir::new().unwrap();
        let watch = TempDir::new().unwrap();
        let (task, index) = scanner(&index_dir, &watch);

        let file = watch.path().join("app.log");
        std::fs::write(&file, "complete\npartial without newline").unwrap();
        task.scan_all().await;
        task.pipeline.buffer().flush().await;
        assert_eq!(index.total_doc_count(), 1);

        let mut f = std::fs::OpenOptions::new().append(true).open(&file).unwrap();
        writeln!(f).unwrap();
        drop(f);
        task.scan_all().await;
        task.pipeline.buffer().flush().await;
        assert_eq!(index.total_doc_count(), 2);
    }
}
