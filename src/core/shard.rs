// src/core/shard.rs

//! Distributed query fan-out. The router selects target shards from the
//! sharding policy, runs the local shard in-process, queries remote shards
//! over HTTP with a per-node deadline, and merges everything newest-first.
//! Nodes that error or time out simply contribute nothing.

use crate::core::cache::{CacheKey, SearchCache};
use crate::core::index::PartitionedIndex;
use crate::core::model::LogRecord;
use dashmap::DashMap;
use futures::future::join_all;
use murmur3::murmur3_x64_128;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Per-node deadline for a fan-out leg.
const SHARD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardingType {
    TimeBased,
    SourceBased,
    #[default]
    Balanced,
}

pub struct ShardRouter {
    enabled: bool,
    local_node_id: String,
    sharding_type: ShardingType,
    number_of_shards: usize,
    /// Node id -> base URL. The local node is present with its own id.
    nodes: DashMap<String, String>,
    index: Arc<PartitionedIndex>,
    cache: Arc<SearchCache>,
    http: reqwest::Client,
}

impl ShardRouter {
    pub fn new(
        enabled: bool,
        local_node_id: String,
        sharding_type: ShardingType,
        number_of_shards: usize,
        index: Arc<PartitionedIndex>,
        cache: Arc<SearchCache>,
    ) -> Self {
        Self {
            enabled,
            local_node_id,
            sharding_type,
            number_of_shards: number_of_shards.max(1),
            nodes: DashMap::new(),
            index,
            cache,
            http: reqwest::Client::builder()
                .timeout(SHARD_TIMEOUT)
                .build()
                .expect("shard http client"),
        }
    }

    pub fn register_node(&self, id: &str, url: &str) {
        if self.nodes.insert(id.to_string(), url.to_string()).is_none() {
            debug!("Shard router registered node '{}' at {}.", id, url);
        }
    }

    pub fn remove_node(&self, id: &str) {
        if self.nodes.remove(id).is_some() {
            debug!("Shard router removed node '{}'.", id);
        }
    }

    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Fans a search out across the selected shards and merges the results,
    /// newest first. The merged set is cached under the search signature.
    pub async fn distributed_search(
        &self,
        query: &str,
        is_regex: bool,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Vec<LogRecord> {
        if !self.enabled || self.nodes.len() <= 1 {
            return self.index.search(query, is_regex, start_time, end_time);
        }

        let key = CacheKey::new(query, is_regex, start_time, end_time);
        if let Some(cached) = self.cache.get(&key) {
            return cached.as_ref().clone();
        }

        let targets = self.select_targets(query, start_time, end_time);
        let futures = targets.into_iter().map(|(id, url)| {
            let query = query.to_string();
            async move {
                if id == self.local_node_id {
                    self.index.search(&query, is_regex, start_time, end_time)
                } else {
                    self.remote_search(&id, &url, &query, is_regex, start_time, end_time)
                        .await
                }
            }
        });

        let mut merged: Vec<LogRecord> = join_all(futures).await.into_iter().flatten().collect();
        merged.sort_by_key(|r| std::cmp::Reverse(r.effective_time()));

        self.cache.put(key, merged.clone());
        merged
    }

    /// Shard selection per the configured policy. Node ordering is made
    /// deterministic by sorting ids.
    fn select_targets(
        &self,
        query: &str,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Vec<(String, String)> {
        let mut all: Vec<(String, String)> = self
            .nodes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));

        match self.sharding_type {
            ShardingType::Balanced => all,
            ShardingType::TimeBased => {
                if start_time.is_none() && end_time.is_none() {
                    all
                } else {
                    let take = self.number_of_shards.min(all.len());
                    all.into_iter().take(take).collect()
                }
            }
            ShardingType::SourceBased => match extract_source_token(query) {
                Some(value) => {
                    let idx = (source_hash(&value) % all.len() as u128) as usize;
                    vec![all[idx].clone()]
                }
                None => all,
            },
        }
    }

    async fn remote_search(
        &self,
        node_id: &str,
        url: &str,
        query: &str,
        is_regex: bool,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Vec<LogRecord> {
        let endpoint = format!("{}/api/logs/search", url.trim_end_matches('/'));
        let mut params: Vec<(&str, String)> = vec![
            ("query", query.to_string()),
            ("isRegex", is_regex.to_string()),
            ("isShardRequest", "true".to_string()),
        ];
        if let Some(start) = start_time {
            params.push(("startTime", start.to_string()));
        }
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }

        let result = async {
            let response = self.http.get(&endpoint).query(&params).send().await?;
            response.error_for_status_ref()?;
            response.json::<Vec<LogRecord>>().await
        }
        .await;

        match result {
            Ok(records) => records,
            Err(e) => {
                warn!(
                    "Shard search against node '{}' failed: {}. Contributing empty result.",
                    node_id, e
                );
                Vec::new()
            }
        }
    }
}

/// Pulls the value of a `source:<value>` token out of a query string.
/// Quoted values are honored.
fn extract_source_token(query: &str) -> Option<String> {
    let start = query.find("source:")? + "source:".len();
    let rest = &query[start..];
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        let value: String = rest.chars().take_while(|c| !c.is_whitespace()).collect();
        (!value.is_empty()).then_some(value)
    }
}

fn source_hash(value: &str) -> u128 {
    murmur3_x64_128(&mut Cursor::new(value.as_bytes()), 0).unwrap_or_default()
}
