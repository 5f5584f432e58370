// src/core/query/mod.rs

//! The pipeline query engine: parses a `|`-separated query and executes it
//! against the partitioned index. `stats` is terminal; any stages after it
//! are ignored. `eval` is accepted and passes records through unchanged.

pub mod pipeline;

use crate::core::errors::LogLensError;
use crate::core::index::PartitionedIndex;
use crate::core::model::{LogLevel, LogRecord};
use pipeline::{PipelineStage, SearchTerm, SortField, parse_pipeline};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryResultType {
    LogEntries,
    Statistics,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub result_type: QueryResultType,
    pub log_entries: Vec<LogRecord>,
    pub statistics: HashMap<String, u64>,
}

impl QueryResult {
    fn entries(log_entries: Vec<LogRecord>) -> Self {
        Self {
            result_type: QueryResultType::LogEntries,
            log_entries,
            statistics: HashMap::new(),
        }
    }

    fn statistics(statistics: HashMap<String, u64>) -> Self {
        Self {
            result_type: QueryResultType::Statistics,
            log_entries: Vec::new(),
            statistics,
        }
    }
}

pub struct QueryEngine {
    index: Arc<PartitionedIndex>,
}

impl QueryEngine {
    pub fn new(index: Arc<PartitionedIndex>) -> Self {
        Self { index }
    }

    pub fn execute(&self, query: &str) -> Result<QueryResult, LogLensError> {
        let stages = parse_pipeline(query)?;

        let mut records: Vec<LogRecord> = Vec::new();
        for stage in stages {
            match stage {
                PipelineStage::Search(term) => {
                    records = self.run_search(&term);
                }
                PipelineStage::Where { field, value } => {
                    records.retain(|r| field_value(r, &field).is_some_and(|v| v == value));
                }
                PipelineStage::Stats { group_by } => {
                    // Terminal: everything after stats is ignored.
                    return Ok(QueryResult::statistics(compute_stats(&records, group_by)));
                }
                PipelineStage::Eval { expression } => {
                    // Reserved hook; records flow through unchanged.
                    if !expression.is_empty() {
                        debug!("eval stage '{}' is a pass-through.", expression);
                    }
                }
                PipelineStage::Sort { field, descending } => {
                    match field {
                        SortField::Timestamp => {
                            records.sort_by_key(|r| r.effective_time());
                        }
                        SortField::Level => {
                            records.sort_by_key(|r| level_rank(r.level));
                        }
                    }
                    if descending {
                        records.reverse();
                    }
                }
                PipelineStage::Head(n) => {
                    records.truncate(n);
                }
                PipelineStage::Tail(n) => {
                    if records.len() > n {
                        records.drain(..records.len() - n);
                    }
                }
            }
        }
        Ok(QueryResult::entries(records))
    }

    fn run_search(&self, term: &SearchTerm) -> Vec<LogRecord> {
        match term {
            SearchTerm::Text(text) => self.index.search(text, false, None, None),
            SearchTerm::Field { name, value } => match name.as_str() {
                "level" => self.index.find_by_level(value),
                "source" => self.index.find_by_source(value),
                _ => self.index.find_by_metadata(name, value),
            },
        }
    }
}

/// Resolves a stage field name against a record.
fn field_value(record: &LogRecord, field: &str) -> Option<String> {
    match field {
        "level" => Some(record.level.to_string()),
        "source" => Some(record.source.clone()),
        "message" => Some(record.message.clone()),
        "id" => Some(record.id.clone()),
        other => record.metadata.get(other).cloned(),
    }
}

fn compute_stats(records: &[LogRecord], group_by: Option<String>) -> HashMap<String, u64> {
    match group_by {
        None => HashMap::from([("count".to_string(), records.len() as u64)]),
        Some(field) => {
            let mut counts: HashMap<String, u64> = HashMap::new();
            for record in records {
                let key = field_value(record, &field).unwrap_or_else(|| "unknown".into());
                *counts.entry(key).or_default() += 1;
            }
            counts
        }
    }
}

/// Severity rank, most severe first.
fn level_rank(level: LogLevel) -> u8 {
    match level {
        LogLevel::Emergency => 0,
        LogLevel::Alert => 1,
        LogLevel::Critical => 2,
        LogLevel::Error => 3,
        LogLevel::Warn => 4,
        LogLevel::Notice => 5,
        LogLevel::Info => 6,
        LogLevel::Debug => 7,
        LogLevel::Trace => 8,
        LogLevel::Unknown => 9,
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

    fn engine(dir: &TempDir) -> QueryEngine {
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
                Arc::new(SearchCache::new(100, 60_000, true)),
                Arc::new(RecordEventBus::new()),
                None,
            )
            .unwrap(),
        );

        let mut records = Vec::new();
        for (n, (level, source)) in [
            (LogLevel::Error, "app.log"),
            (LogLevel::Error, "app.log"),
            (LogLevel::Info, "app.log"),
            (LogLevel::Error, "other.log"),
        ]
        .iter()
        .enumerate()
        {
            let mut r = LogRecord::new(
                format!("request failed {n}"),
                source.to_string(),
                format!("raw {n}"),
            );
            r.level = *level;
            r.record_time = Some(1_000 + n as i64);
            records.push(r);
        }
        index.index_all(records).unwrap();
        QueryEngine::new(index)
    }

    #[test]
    fn search_then_where_filters() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir)
            .execute("search failed | where source=app.log")
            .unwrap();
        assert_eq!(result.result_type, QueryResultType::LogEntries);
        assert_eq!(result.log_entries.len(), 3);
    }

    #[test]
    fn search_by_level_term() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir).execute("search level=ERROR").unwrap();
        assert_eq!(result.log_entries.len(), 3);
    }

    #[test]
    fn stats_count_by_group() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir)
            .execute("search failed | stats count by source")
            .unwrap();
        assert_eq!(result.result_type, QueryResultType::Statistics);
        assert_eq!(result.statistics["app.log"], 3);
        assert_eq!(result.statistics["other.log"], 1);
    }

    #[test]
    fn stats_is_terminal() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir)
            .execute("search failed | stats count | head 1")
            .unwrap();
        assert_eq!(result.result_type, QueryResultType::Statistics);
        assert_eq!(result.statistics["count"], 4);
    }

    #[test]
    fn sort_and_head_and_tail() {
        let dir = TempDir::new().unwrap();
        let e = engine(&dir);

        let asc = e.execute("search failed | sort timestamp").unwrap();
        let times: Vec<i64> = asc.log_entries.iter().map(|r| r.effective_time()).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));

        let head = e.execute("search failed | sort -timestamp | head 2").unwrap();
        assert_eq!(head.log_entries.len(), 2);
        assert_eq!(head.log_entries[0].effective_time(), 1_003);

        let tail = e.execute("search failed | sort timestamp | tail 2").unwrap();
        assert_eq!(tail.log_entries.len(), 2);
        assert_eq!(tail.log_entries[1].effective_time(), 1_003);
    }

    #[test]
    fn eval_passes_records_through() {
        let dir = TempDir::new().unwrap();
        let result = engine(&dir)
            .execute("search failed | eval x = 1 | head 10")
            .unwrap();
        assert_eq!(result.log_entries.len(), 4);
    }
}
