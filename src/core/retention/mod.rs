// src/core/retention/mod.rs

//! Retention policies and their application. A policy bounds the age of
//! records for a set of sources (empty set = every source); applying a
//! policy archives the doomed records (when auto-archive is on, handled
//! inside the index) and then deletes them.

pub mod archive;

use crate::core::errors::LogLensError;
use crate::core::index::PartitionedIndex;
use crate::core::model::now_millis;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

const DAY_MS: i64 = 86_400_000;

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// Generated when absent so API clients can omit it on create.
    #[serde(default = "generate_id")]
    pub id: String,
    pub name: String,
    pub max_age_days: u32,
    pub enabled: bool,
    /// Empty means the policy applies to every source.
    #[serde(default)]
    pub apply_to_sources: Vec<String>,
}

impl RetentionPolicy {
    pub fn new(name: impl Into<String>, max_age_days: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            max_age_days,
            enabled: true,
            apply_to_sources: Vec::new(),
        }
    }

    fn validate(&self) -> Result<(), LogLensError> {
        if self.name.trim().is_empty() {
            return Err(LogLensError::Validation("policy name cannot be empty".into()));
        }
        if self.max_age_days == 0 {
            return Err(LogLensError::Validation(
                "maxAgeDays must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

pub struct RetentionManager {
    index: Arc<PartitionedIndex>,
    policies: RwLock<Vec<RetentionPolicy>>,
}

impl RetentionManager {
    pub fn new(index: Arc<PartitionedIndex>, policies: Vec<RetentionPolicy>) -> Self {
        Self {
            index,
            policies: RwLock::new(policies),
        }
    }

    pub fn add_policy(&self, policy: RetentionPolicy) -> Result<(), LogLensError> {
        policy.validate()?;
        let mut policies = self.policies.write();
        if policies.iter().any(|p| p.name == policy.name) {
            return Err(LogLensError::Conflict(format!(
                "retention policy '{}' already exists",
                policy.name
            )));
        }
        policies.push(policy);
        Ok(())
    }

    pub fn update_policy(&self, policy: RetentionPolicy) -> Result<(), LogLensError> {
        policy.validate()?;
        let mut policies = self.policies.write();
        let slot = policies
            .iter_mut()
            .find(|p| p.id == policy.id)
            .ok_or_else(|| LogLensError::NotFound(format!("retention policy '{}'", policy.id)))?;
        *slot = policy;
        Ok(())
    }

    pub fn remove_policy(&self, id: &str) -> Result<(), LogLensError> {
        let mut policies = self.policies.write();
        let before = policies.len();
        policies.retain(|p| p.id != id);
        if policies.len() == before {
            return Err(LogLensError::NotFound(format!("retention policy '{id}'")));
        }
        Ok(())
    }

    pub fn list_policies(&self) -> Vec<RetentionPolicy> {
        self.policies.read().clone()
    }

    /// Applies every enabled policy. A failing policy is logged and the rest
    /// still run; returns the total number of deleted records.
    pub fn apply_all(&self) -> usize {
        let policies = self.list_policies();
        let mut deleted = 0;
        for policy in policies.iter().filter(|p| p.enabled) {
            let threshold = now_millis() - i64::from(policy.max_age_days) * DAY_MS;
            let result = if policy.apply_to_sources.is_empty() {
                self.index.delete_older_than(threshold, None)
            } else {
                let mut total = 0;
                let mut last_err = None;
                for source in &policy.apply_to_sources {
                    match self.index.delete_older_than(threshold, Some(source)) {
                        Ok(n) => total += n,
                        Err(e) => last_err = Some(e),
                    }
                }
                match last_err {
                    Some(e) if total == 0 => Err(e),
                    _ => Ok(total),
                }
            };
            match result {
                Ok(n) => {
                    if n > 0 {
                        info!("Retention policy '{}' deleted {} record(s).", policy.name, n);
                    }
                    deleted += n;
                }
                Err(e) => error!("Retention policy '{}' failed: {}", policy.name, e),
            }
        }
        deleted
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
    use crate::core::model::LogRecord;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> RetentionManager {
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
        RetentionManager::new(index, Vec::new())
    }

    #[test]
    fn policy_validation() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        assert!(m.add_policy(RetentionPolicy::new("", 30)).is_err());
        assert!(m.add_policy(RetentionPolicy::new("zero", 0)).is_err());
        assert!(m.add_policy(RetentionPolicy::new("ok", 30)).is_ok());
        // Duplicate name is a conflict.
        assert!(matches!(
            m.add_policy(RetentionPolicy::new("ok", 7)),
            Err(LogLensError::Conflict(_))
        ));
    }

    #[test]
    fn apply_deletes_expired_records_per_source() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);

        let mut expired = LogRecord::new("ancient", "app.log", "raw-ancient");
        expired.ingest_time = now_millis() - 90 * DAY_MS;
        let fresh = LogRecord::new("fresh", "app.log", "raw-fresh");
        let mut other = LogRecord::new("ancient other", "other.log", "raw-other");
        other.ingest_time = now_millis() - 90 * DAY_MS;
        m.index.index_all(vec![expired, fresh, other]).unwrap();

        let mut policy = RetentionPolicy::new("app-only", 30);
        policy.apply_to_sources = vec!["app.log".into()];
        m.add_policy(policy).unwrap();

        assert_eq!(m.apply_all(), 1);
        assert_eq!(m.index.total_doc_count(), 2);
        assert_eq!(m.index.find_by_source("other.log").len(), 1);
    }

    #[test]
    fn disabled_policy_is_skipped() {
        let dir = TempDir::new().unwrap();
        let m = manager(&dir);
        let mut expired = LogRecord::new("ancient", "app.log", "raw-ancient");
        expired.ingest_time = now_millis() - 90 * DAY_MS;
        m.index.index_all(vec![expired]).unwrap();

        let mut policy = RetentionPolicy::new("off", 30);
        policy.enabled = false;
        m.add_policy(policy).unwrap();
        assert_eq!(m.apply_all(), 0);
        assert_eq!(m.index.total_doc_count(), 1);
    }
}
