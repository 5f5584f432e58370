// src/core/retention/archive.rs

//! Cold archival of deleted records. Each archival produces one ZIP file
//! holding `metadata.json` and `logs.json` (one record per line, UTF-8);
//! the metadata registry mirrors what is on disk and survives restarts by
//! rescanning the archive directory.

use crate::core::errors::LogLensError;
use crate::core::model::{LogRecord, now_millis};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const METADATA_ENTRY: &str = "metadata.json";
const LOGS_ENTRY: &str = "logs.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub id: String,
    pub filename: String,
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub sources: Vec<String>,
    pub log_count: usize,
    pub compression_type: String,
    pub compression_level: u32,
    pub size_bytes: u64,
    pub created_at: i64,
    pub available: bool,
}

pub struct ArchiveStore {
    directory: PathBuf,
    compression_level: u32,
    retention_days: u32,
    metadata: DashMap<String, ArchiveMetadata>,
}

impl ArchiveStore {
    /// Opens the archive directory and rebuilds the metadata registry by
    /// reading `metadata.json` out of every ZIP found there.
    pub fn open(
        directory: impl Into<PathBuf>,
        compression_level: u32,
        retention_days: u32,
    ) -> Result<Self, LogLensError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        let store = Self {
            directory,
            compression_level: compression_level.min(9),
            retention_days,
            metadata: DashMap::new(),
        };
        store.rescan()?;
        Ok(store)
    }

    fn rescan(&self) -> Result<(), LogLensError> {
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "zip") {
                continue;
            }
            match read_metadata_entry(&path) {
                Ok(mut meta) => {
                    meta.size_bytes = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                    meta.available = true;
                    self.metadata.insert(meta.id.clone(), meta);
                }
                Err(e) => warn!(
                    "Ignoring unreadable archive '{}': {}",
                    path.display(),
                    e
                ),
            }
        }
        if !self.metadata.is_empty() {
            info!("Archive store loaded {} archive(s).", self.metadata.len());
        }
        Ok(())
    }

    /// Writes one ZIP containing the given records and registers its
    /// metadata. The file size is read back after the write completes.
    pub fn archive_records(&self, records: &[LogRecord]) -> Result<ArchiveMetadata, LogLensError> {
        if records.is_empty() {
            return Err(LogLensError::Archive("nothing to archive".into()));
        }

        let filename = self.unique_filename();
        let path = self.directory.join(&filename);

        let mut sources: Vec<String> = records.iter().map(|r| r.source.clone()).collect();
        sources.sort();
        sources.dedup();

        let mut meta = ArchiveMetadata {
            id: Uuid::new_v4().to_string(),
            filename: filename.clone(),
            start_timestamp: records.iter().map(|r| r.effective_time()).min().unwrap_or(0),
            end_timestamp: records.iter().map(|r| r.effective_time()).max().unwrap_or(0),
            sources,
            log_count: records.len(),
            compression_type: "zip".into(),
            compression_level: self.compression_level,
            size_bytes: 0,
            created_at: now_millis(),
            available: true,
        };

        let file = File::create(&path)?;
        let mut writer = ZipWriter::new(file);
        let options = || {
            SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(self.compression_level as i64))
        };

        writer.start_file(METADATA_ENTRY, options())?;
        writer.write_all(serde_json::to_string_pretty(&meta)?.as_bytes())?;

        writer.start_file(LOGS_ENTRY, options())?;
        for record in records {
            writer.write_all(serde_json::to_string(record)?.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.finish()?;

        meta.size_bytes = fs::metadata(&path)?.len();
        info!(
            "Archived {} records to '{}' ({} bytes).",
            meta.log_count, filename, meta.size_bytes
        );
        self.metadata.insert(meta.id.clone(), meta.clone());
        Ok(meta)
    }

    fn unique_filename(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let base = format!("logs_{stamp}.zip");
        if !self.directory.join(&base).exists() {
            return base;
        }
        // Same-second archivals get a numeric suffix.
        for n in 1.. {
            let candidate = format!("logs_{stamp}_{n}.zip");
            if !self.directory.join(&candidate).exists() {
                return candidate;
            }
        }
        unreachable!()
    }

    /// Reads the record set back out of an archive by id.
    pub fn extract(&self, id: &str) -> Result<Vec<LogRecord>, LogLensError> {
        let meta = self
            .metadata
            .get(id)
            .map(|m| m.clone())
            .ok_or_else(|| LogLensError::NotFound(format!("archive '{id}'")))?;

        let path = self.directory.join(&meta.filename);
        if !path.exists() {
            self.mark_unavailable(id);
            return Err(LogLensError::NotFound(format!(
                "archive file '{}' is missing",
                meta.filename
            )));
        }

        let file = File::open(&path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut entry = archive.by_name(LOGS_ENTRY)?;
        let mut contents = String::new();
        entry.read_to_string(&mut contents)?;

        let mut records = Vec::with_capacity(meta.log_count);
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str::<LogRecord>(line)?);
        }
        Ok(records)
    }

    fn mark_unavailable(&self, id: &str) {
        if let Some(mut meta) = self.metadata.get_mut(id) {
            meta.available = false;
        }
    }

    /// Deletes archives older than the retention window (file + metadata)
    /// and flags metadata whose backing file has gone missing. Returns the
    /// number of archives removed.
    pub fn cleanup_expired(&self) -> usize {
        if self.retention_days == 0 {
            return 0;
        }
        let threshold = now_millis() - i64::from(self.retention_days) * 86_400_000;

        let expired: Vec<(String, String)> = self
            .metadata
            .iter()
            .filter(|e| e.created_at < threshold)
            .map(|e| (e.id.clone(), e.filename.clone()))
            .collect();

        let mut removed = 0;
        for (id, filename) in expired {
            let path = self.directory.join(&filename);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to delete expired archive '{}': {}", filename, e);
                    continue;
                }
            }
            self.metadata.remove(&id);
            removed += 1;
        }

        // Surviving metadata with a missing file becomes unavailable.
        for mut entry in self.metadata.iter_mut() {
            if !self.directory.join(&entry.filename).exists() {
                entry.available = false;
            }
        }

        if removed > 0 {
            info!("Archive cleanup removed {} expired archive(s).", removed);
        }
        removed
    }

    pub fn list(&self) -> Vec<ArchiveMetadata> {
        let mut all: Vec<ArchiveMetadata> = self.metadata.iter().map(|e| e.clone()).collect();
        all.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        all
    }

    pub fn get(&self, id: &str) -> Option<ArchiveMetadata> {
        self.metadata.get(id).map(|m| m.clone())
    }
}

fn read_metadata_entry(path: &Path) -> Result<ArchiveMetadata, LogLensError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let mut entry = archive.by_name(METADATA_ENTRY)?;
    let mut contents = String::new();
    entry.read_to_string(&mut contents)?;
    Ok(serde_json::from_str(&contents)?)
}
