// src/core/cache.rs

//! The search result cache: a concurrent map keyed by the full search
//! signature, evicted LRU-style by last access time once full, with a TTL
//! measured from the last access. Counters are atomics so hot-path reads
//! never take a lock; the eviction scan only runs on capacity transitions.

use crate::core::model::{LogRecord, now_millis};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::debug;

/// The full identity of a search: query text, regex flag, and time bounds
/// (absent bounds collapse to zero).
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub query: String,
    pub is_regex: bool,
    pub start_time: i64,
    pub end_time: i64,
}

impl CacheKey {
    pub fn new(query: &str, is_regex: bool, start: Option<i64>, end: Option<i64>) -> Self {
        Self {
            query: query.to_string(),
            is_regex,
            start_time: start.unwrap_or(0),
            end_time: end.unwrap_or(0),
        }
    }
}

struct CacheEntry {
    results: Arc<Vec<LogRecord>>,
    created_at: i64,
    last_access: AtomicI64,
    access_count: AtomicU64,
}

/// A point-in-time view of the cache counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub size: usize,
    pub max_size: usize,
    pub expiration_ms: i64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_ratio: f64,
}

pub struct SearchCache {
    entries: DashMap<CacheKey, CacheEntry>,
    max_size: usize,
    expiration_ms: i64,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SearchCache {
    pub fn new(max_size: usize, expiration_ms: i64, enabled: bool) -> Self {
        Self {
            entries: DashMap::new(),
            max_size,
            expiration_ms,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Looks up a cached result. Expired entries are evicted and reported as
    /// a miss; hits refresh the access time and count.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<LogRecord>>> {
        if !self.enabled {
            return None;
        }
        let now = now_millis();

        if let Some(entry) = self.entries.get(key) {
            if now - entry.last_access.load(Ordering::Relaxed) > self.expiration_ms {
                drop(entry);
                self.entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_access.store(now, Ordering::Relaxed);
            entry.access_count.fetch_add(1, Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.results.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts a result set, evicting the least-recently-accessed entry when
    /// the cache is at capacity.
    pub fn put(&self, key: CacheKey, results: Vec<LogRecord>) {
        if !self.enabled {
            return;
        }
        if self.max_size == 0 {
            return;
        }

        if self.entries.len() >= self.max_size && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|e| e.value().last_access.load(Ordering::Relaxed))
                .map(|e| e.key().clone())
            {
                self.entries.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let now = now_millis();
        self.entries.insert(
            key,
            CacheEntry {
                results: Arc::new(results),
                created_at: now,
                last_access: AtomicI64::new(now),
                access_count: AtomicU64::new(0),
            },
        );
    }

    /// Drops every entry whose last access is older than the TTL. Called by
    /// the background sweeper.
    pub fn sweep_expired(&self) -> usize {
        let now = now_millis();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now - entry.last_access.load(Ordering::Relaxed) <= self.expiration_ms);
        let swept = before - self.entries.len();
        if swept > 0 {
            self.evictions.fetch_add(swept as u64, Ordering::Relaxed);
            debug!("Search cache sweeper removed {} expired entries.", swept);
        }
        swept
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            size: self.entries.len(),
            max_size: self.max_size,
            expiration_ms: self.expiration_ms,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_ratio: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    /// Age of an entry since creation, for diagnostics.
    pub fn entry_age_ms(&self, key: &CacheKey) -> Option<i64> {
        self.entries
            .get(key)
            .map(|e| now_millis() - e.created_at)
    }
}
