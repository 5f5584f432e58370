// src/core/ingest/coordinator.rs

//! The horizontal-scaling gate. Every instance heartbeats into a shared
//! registry; a source is ingested only by the instance its id hashes to.
//! With scaling disabled (or an empty active set) every source is processed
//! locally.

use dashmap::DashMap;
use murmur3::murmur3_x64_128;
use std::io::Cursor;

use crate::core::model::now_millis;

pub struct IngestionCoordinator {
    enabled: bool,
    instance_id: String,
    heartbeat_timeout_ms: i64,
    /// Instance id -> last heartbeat epoch millis.
    instances: DashMap<String, i64>,
}

impl IngestionCoordinator {
    pub fn new(enabled: bool, instance_id: String, heartbeat_timeout_ms: i64) -> Self {
        let coordinator = Self {
            enabled,
            instance_id,
            heartbeat_timeout_ms,
            instances: DashMap::new(),
        };
        coordinator.record_heartbeat_self();
        coordinator
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Registers a heartbeat for this instance.
    pub fn record_heartbeat_self(&self) {
        self.instances
            .insert(self.instance_id.clone(), now_millis());
    }

    /// Registers a heartbeat observed from a peer instance.
    pub fn record_heartbeat(&self, instance_id: &str) {
        self.instances.insert(instance_id.to_string(), now_millis());
    }

    /// Drops instances whose heartbeat has gone stale.
    pub fn expire_stale(&self) {
        let threshold = now_millis() - self.heartbeat_timeout_ms;
        self.instances.retain(|id, last| {
            *last >= threshold || id == &self.instance_id
        });
    }

    /// Sorted ids of instances with a fresh heartbeat.
    pub fn active_instances(&self) -> Vec<String> {
        let threshold = now_millis() - self.heartbeat_timeout_ms;
        let mut active: Vec<String> = self
            .instances
            .iter()
            .filter(|e| *e.value() >= threshold)
            .map(|e| e.key().clone())
            .collect();
        active.sort();
        active
    }

    /// Whether this instance owns the given source. Exactly one active
    /// instance answers true for any source id.
    pub fn should_process_source(&self, source_id: &str) -> bool {
        if !self.enabled {
            return true;
        }
        let active = self.active_instances();
        if active.is_empty() {
            return true;
        }
        let hash = source_hash(source_id);
        let assigned = &active[(hash % active.len() as u128) as usize];
        assigned == &self.instance_id
    }
}

fn source_hash(source_id: &str) -> u128 {
    murmur3_x64_128(&mut Cursor::new(source_id.as_bytes()), 0).unwrap_or_default()
}
