// src/core/index/partition.rs

//! A single time-bucketed partition: an in-memory inverted index over the
//! records it owns, backed by an append-only JSON-lines segment file that is
//! replayed on open. The partition exclusively owns its directory; staged
//! writes become visible only after `commit`, which persists them first.

use super::fields::FieldRegistry;
use super::text_query::{SearchQuery, TextClause, tokenize};
use crate::core::errors::LogLensError;
use crate::core::model::LogRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const SEGMENT_FILE: &str = "segment.jsonl";

pub struct Partition {
    /// Directory name, e.g. `partition_2023-10-10`, or `main` in single-index mode.
    pub name: String,
    /// Calendar bucket label; empty in single-index mode.
    pub label: String,
    dir: PathBuf,
    fields: Arc<FieldRegistry>,
    inner: RwLock<PartitionInner>,
}

#[derive(Default)]
struct PartitionInner {
    docs: HashMap<u64, LogRecord>,
    /// Dedup map: raw line content to internal doc id. Re-indexing the same
    /// raw content within a partition overwrites the previous document.
    by_raw: HashMap<String, u64>,
    by_record_id: HashMap<String, u64>,
    /// Inverted index over tokenized message + raw content (+ tokenized
    /// custom fields).
    terms: HashMap<String, Vec<u64>>,
    by_level: HashMap<String, Vec<u64>>,
    by_source: HashMap<String, Vec<u64>>,
    /// Exact `key=value` metadata terms.
    meta_terms: HashMap<String, Vec<u64>>,
    pending: Vec<LogRecord>,
    next_doc_id: u64,
}

impl Partition {
    /// Opens (or creates) the partition directory and replays the segment
    /// file into the in-memory index.
    pub fn open(
        base_dir: &Path,
        name: &str,
        label: &str,
        fields: Arc<FieldRegistry>,
    ) -> Result<Self, LogLensError> {
        let dir = base_dir.join(name);
        fs::create_dir_all(&dir)?;

        let partition = Self {
            name: name.to_string(),
            label: label.to_string(),
            dir,
            fields,
            inner: RwLock::new(PartitionInner::default()),
        };
        partition.replay_segment()?;
        Ok(partition)
    }

    fn segment_path(&self) -> PathBuf {
        self.dir.join(SEGMENT_FILE)
    }

    fn replay_segment(&self) -> Result<(), LogLensError> {
        let path = self.segment_path();
        if !path.exists() {
            return Ok(());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut inner = self.inner.write();
        let mut replayed = 0usize;
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) => {
                    apply(&mut inner, record, &self.fields);
                    replayed += 1;
                }
                Err(e) => warn!(
                    "Skipping corrupt segment line in partition '{}': {}",
                    self.name, e
                ),
            }
        }
        if replayed > 0 {
            debug!("Partition '{}' replayed {} records.", self.name, replayed);
        }
        Ok(())
    }

    /// Queues a record for the next commit. Staged records are not yet
    /// visible to searches.
    pub fn stage(&self, record: LogRecord) {
        self.inner.write().pending.push(record);
    }

    /// Persists staged records to the segment file, then applies them to the
    /// in-memory index. Returns the records that became visible.
    pub fn commit(&self) -> Result<Vec<LogRecord>, LogLensError> {
        let pending = {
            let mut inner = self.inner.write();
            std::mem::take(&mut inner.pending)
        };
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.segment_path())?;
        let mut writer = BufWriter::new(file);
        for record in &pending {
            serde_json::to_writer(&mut writer, record)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        writer.get_ref().sync_data()?;

        let mut inner = self.inner.write();
        for record in pending.iter().cloned() {
            apply(&mut inner, record, &self.fields);
        }
        Ok(pending)
    }

    /// Executes the text + time clauses, newest first, capped at `limit`.
    pub fn search(&self, query: &SearchQuery, limit: usize) -> Vec<LogRecord> {
        let inner = self.inner.read();

        let mut hits: Vec<LogRecord> = match &query.clause {
            TextClause::Tokens(tokens) => {
                let mut candidate_ids: Option<Vec<u64>> = None;
                for token in tokens {
                    let postings = match inner.terms.get(token) {
                        Some(p) => p,
                        None => return Vec::new(),
                    };
                    candidate_ids = Some(match candidate_ids {
                        None => postings.clone(),
                        Some(prev) => prev.into_iter().filter(|id| postings.contains(id)).collect(),
                    });
                }
                candidate_ids
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|id| inner.docs.get(id))
                    .filter(|r| query.time_matches(r))
                    .cloned()
                    .collect()
            }
            _ => inner
                .docs
                .values()
                .filter(|r| query.text_matches(r) && query.time_matches(r))
                .cloned()
                .collect(),
        };

        hits.sort_by_key(|r| std::cmp::Reverse(r.effective_time()));
        hits.truncate(limit);
        hits
    }

    pub fn find_by_level(&self, level: &str, limit: usize) -> Vec<LogRecord> {
        let inner = self.inner.read();
        lookup(&inner, inner.by_level.get(&level.to_uppercase()), limit)
    }

    pub fn find_by_source(&self, source: &str, limit: usize) -> Vec<LogRecord> {
        let inner = self.inner.read();
        lookup(&inner, inner.by_source.get(source), limit)
    }

    pub fn find_by_metadata(&self, key: &str, value: &str, limit: usize) -> Vec<LogRecord> {
        let inner = self.inner.read();
        lookup(&inner, inner.meta_terms.get(&format!("{key}={value}")), limit)
    }

    pub fn find_by_id(&self, id: &str) -> Option<LogRecord> {
        let inner = self.inner.read();
        inner
            .by_record_id
            .get(id)
            .and_then(|internal| inner.docs.get(internal))
            .cloned()
    }

    /// Removes records with `ingest_time <= threshold` (optionally restricted
    /// to one source), up to `cap`, rewrites the segment, and returns the
    /// removed records for archiving.
    pub fn delete_older_than(
        &self,
        threshold: i64,
        source: Option<&str>,
        cap: usize,
    ) -> Result<Vec<LogRecord>, LogLensError> {
        let mut inner = self.inner.write();

        let doomed: Vec<u64> = inner
            .docs
            .iter()
            .filter(|(_, r)| {
                r.ingest_time <= threshold && source.is_none_or(|s| r.source == s)
            })
            .map(|(id, _)| *id)
            .take(cap)
            .collect();

        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(record) = remove_doc(&mut inner, id) {
                removed.push(record);
            }
        }

        self.rewrite_segment(&inner)?;
        Ok(removed)
    }

    fn rewrite_segment(&self, inner: &PartitionInner) -> Result<(), LogLensError> {
        let tmp_path = self.dir.join("segment.jsonl.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            for record in inner.docs.values() {
                serde_json::to_writer(&mut writer, record)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp_path, self.segment_path())?;
        Ok(())
    }

    /// All visible records, used when a rotated-out partition is archived.
    pub fn all_records(&self) -> Vec<LogRecord> {
        self.inner.read().docs.values().cloned().collect()
    }

    pub fn doc_count(&self) -> usize {
        self.inner.read().docs.len()
    }

    /// Deletes the partition's files. The partition must not be used after.
    pub fn destroy(&self) -> Result<(), LogLensError> {
        fs::remove_dir_all(&self.dir)?;
        Ok(())
    }
}

fn lookup(inner: &PartitionInner, postings: Option<&Vec<u64>>, limit: usize) -> Vec<LogRecord> {
    let mut hits: Vec<LogRecord> = postings
        .map(|ids| {
            ids.iter()
                .filter_map(|id| inner.docs.get(id))
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    hits.sort_by_key(|r| std::cmp::Reverse(r.effective_time()));
    hits.truncate(limit);
    hits
}

/// Applies one record to the in-memory index, overwriting any existing
/// document with the same raw content.
fn apply(inner: &mut PartitionInner, record: LogRecord, fields: &FieldRegistry) {
    if let Some(&old) = inner.by_raw.get(&record.raw_content) {
        remove_doc(inner, old);
    }

    let internal = inner.next_doc_id;
    inner.next_doc_id += 1;

    for token in doc_tokens(&record, fields) {
        inner.terms.entry(token).or_default().push(internal);
    }
    inner
        .by_level
        .entry(record.level.to_string())
        .or_default()
        .push(internal);
    inner
        .by_source
        .entry(record.source.clone())
        .or_default()
        .push(internal);
    for (key, value) in &record.metadata {
        if is_meta_indexed(key, fields) {
            inner
                .meta_terms
                .entry(format!("{key}={value}"))
                .or_default()
                .push(internal);
        }
    }
    inner.by_raw.insert(record.raw_content.clone(), internal);
    inner.by_record_id.insert(record.id.clone(), internal);
    inner.docs.insert(internal, record);
}

fn remove_doc(inner: &mut PartitionInner, internal: u64) -> Option<LogRecord> {
    let record = inner.docs.remove(&internal)?;

    let fields_snapshot: Vec<String> = doc_token_keys(&record);
    for token in fields_snapshot {
        if let Some(postings) = inner.terms.get_mut(&token) {
            postings.retain(|&id| id != internal);
            if postings.is_empty() {
                inner.terms.remove(&token);
            }
        }
    }
    if let Some(postings) = inner.by_level.get_mut(&record.level.to_string()) {
        postings.retain(|&id| id != internal);
    }
    if let Some(postings) = inner.by_source.get_mut(&record.source) {
        postings.retain(|&id| id != internal);
    }
    for (key, value) in &record.metadata {
        if let Some(postings) = inner.meta_terms.get_mut(&format!("{key}={value}")) {
            postings.retain(|&id| id != internal);
        }
    }
    inner.by_raw.remove(&record.raw_content);
    inner.by_record_id.remove(&record.id);
    Some(record)
}

fn doc_tokens(record: &LogRecord, fields: &FieldRegistry) -> Vec<String> {
    let mut tokens = tokenize(&record.message);
    tokens.extend(tokenize(&record.raw_content));
    for (key, value) in &record.metadata {
        if let Some(custom) = key.strip_prefix("custom_")
            && fields.is_tokenized(custom)
        {
            tokens.extend(tokenize(value));
        }
    }
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Token keys for removal. Over-approximates with the default registry so a
/// doc indexed under a since-removed field config is still fully unlinked.
fn doc_token_keys(record: &LogRecord) -> Vec<String> {
    let mut tokens = tokenize(&record.message);
    tokens.extend(tokenize(&record.raw_content));
    for value in record.metadata.values() {
        tokens.extend(tokenize(value));
    }
    tokens.sort();
    tokens.dedup();
    tokens
}

fn is_meta_indexed(key: &str, fields: &FieldRegistry) -> bool {
    match key.strip_prefix("custom_") {
        Some(custom) => fields.is_indexed(custom),
        None => true,
    }
}
