// src/config.rs

//! Manages server configuration: loading, defaulting, and validation.

use crate::core::index::bucket::BucketType;
use crate::core::index::fields::FieldConfig;
use crate::core::ingest::cloud::CloudStreamConfig;
use crate::core::ingest::syslog_server::SyslogProtocol;
use crate::core::shard::ShardingType;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Network settings for the node API.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}

/// Partitioned-index settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub base_dir: String,
    #[serde(default = "default_true")]
    pub partitioning_enabled: bool,
    #[serde(default)]
    pub partition_type: BucketType,
    #[serde(default = "default_max_active_partitions")]
    pub max_active_partitions: usize,
    /// Archive partitions that rotate out of the active set.
    #[serde(default)]
    pub auto_archive: bool,
    /// Custom field configurations applied to `custom_*` metadata.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            base_dir: default_index_dir(),
            partitioning_enabled: true,
            partition_type: BucketType::default(),
            max_active_partitions: default_max_active_partitions(),
            auto_archive: false,
            fields: Vec::new(),
        }
    }
}

fn default_index_dir() -> String {
    "loglens_data/index".to_string()
}
fn default_max_active_partitions() -> usize {
    7
}

/// Ingestion buffer settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_max_size")]
    pub max_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: default_buffer_max_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

fn default_buffer_max_size() -> usize {
    1000
}
fn default_flush_interval_ms() -> u64 {
    30_000
}

/// Search cache settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchCacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,
    #[serde(default = "default_cache_expiration_ms")]
    pub expiration_ms: i64,
    #[serde(default = "default_cache_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
}

impl Default for SearchCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: default_cache_max_size(),
            expiration_ms: default_cache_expiration_ms(),
            cleanup_interval_ms: default_cache_cleanup_interval_ms(),
        }
    }
}

fn default_cache_max_size() -> usize {
    100
}
fn default_cache_expiration_ms() -> i64 {
    300_000
}
fn default_cache_cleanup_interval_ms() -> u64 {
    60_000
}

/// Cold-archive settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_dir")]
    pub directory: String,
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
    #[serde(default)]
    pub auto_archive_enabled: bool,
    #[serde(default = "default_archive_retention_days")]
    pub retention_days: u32,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            directory: default_archive_dir(),
            compression_level: default_compression_level(),
            auto_archive_enabled: false,
            retention_days: default_archive_retention_days(),
        }
    }
}

fn default_archive_dir() -> String {
    "loglens_data/archive".to_string()
}
fn default_compression_level() -> u32 {
    6
}
fn default_archive_retention_days() -> u32 {
    30
}

/// Alarm engine scheduling.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AlarmConfig {
    #[serde(default = "default_evaluation_interval_secs")]
    pub evaluation_interval_secs: u64,
    #[serde(default = "default_grouping_interval_secs")]
    pub grouping_interval_secs: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_secs: default_evaluation_interval_secs(),
            grouping_interval_secs: default_grouping_interval_secs(),
        }
    }
}

fn default_evaluation_interval_secs() -> u64 {
    60
}
fn default_grouping_interval_secs() -> u64 {
    30
}

/// High-availability clustering.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HighAvailabilityConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: i64,
    #[serde(default = "default_leader_check_interval_ms")]
    pub leader_check_interval_ms: u64,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub node_url: Option<String>,
}

impl Default for HighAvailabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            leader_check_interval_ms: default_leader_check_interval_ms(),
            node_id: None,
            node_url: None,
        }
    }
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}
fn default_heartbeat_timeout_ms() -> i64 {
    15_000
}
fn default_leader_check_interval_ms() -> u64 {
    10_000
}

/// Horizontal-scaling ingestion partitioning.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HorizontalScalingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_hs_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: i64,
    #[serde(default)]
    pub instance_id: Option<String>,
}

impl Default for HorizontalScalingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            heartbeat_timeout_ms: default_hs_heartbeat_timeout_ms(),
            instance_id: None,
        }
    }
}

fn default_hs_heartbeat_timeout_ms() -> i64 {
    30_000
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShardNodeConfig {
    pub id: String,
    pub url: String,
}

/// Distributed-search sharding.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShardingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, rename = "type")]
    pub sharding_type: ShardingType,
    #[serde(default = "default_number_of_shards")]
    pub number_of_shards: usize,
    #[serde(default)]
    pub nodes: Vec<ShardNodeConfig>,
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sharding_type: ShardingType::default(),
            number_of_shards: default_number_of_shards(),
            nodes: Vec::new(),
        }
    }
}

fn default_number_of_shards() -> usize {
    2
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SyslogListenerConfig {
    pub protocol: SyslogProtocol,
    pub port: u16,
}

/// Ingestion source definitions.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub directories: Vec<String>,
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    #[serde(default)]
    pub pattern_recognition: bool,
    #[serde(default)]
    pub syslog: Vec<SyslogListenerConfig>,
    #[serde(default)]
    pub cloud: Vec<CloudStreamConfig>,
}

fn default_scan_interval_ms() -> u64 {
    10_000
}

/// Redaction settings applied to parsed records before buffering.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedactionConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_mask")]
    pub mask: String,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            keys: Vec::new(),
            patterns: Vec::new(),
            mask: default_mask(),
        }
    }
}

fn default_mask() -> String {
    crate::core::redaction::DEFAULT_MASK.to_string()
}

/// System health sampling.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_health_threshold")]
    pub cpu_threshold: f64,
    #[serde(default = "default_health_threshold")]
    pub memory_threshold: f64,
    #[serde(default = "default_health_threshold")]
    pub disk_threshold: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval_secs(),
            cpu_threshold: default_health_threshold(),
            memory_threshold: default_health_threshold(),
            disk_threshold: default_health_threshold(),
        }
    }
}

fn default_health_interval_secs() -> u64 {
    60
}
fn default_health_threshold() -> f64 {
    90.0
}

/// A retention policy as declared in the configuration file.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RetentionPolicyConfig {
    pub name: String,
    pub max_age_days: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub apply_to_sources: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// The resolved server configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub search_cache: SearchCacheConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
    #[serde(default)]
    pub high_availability: HighAvailabilityConfig,
    #[serde(default)]
    pub horizontal_scaling: HorizontalScalingConfig,
    #[serde(default)]
    pub sharding: ShardingConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub redaction: RedactionConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub retention_policies: Vec<RetentionPolicyConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            log_level: default_log_level(),
            index: IndexConfig::default(),
            buffer: BufferConfig::default(),
            search_cache: SearchCacheConfig::default(),
            archive: ArchiveConfig::default(),
            alarm: AlarmConfig::default(),
            high_availability: HighAvailabilityConfig::default(),
            horizontal_scaling: HorizontalScalingConfig::default(),
            sharding: ShardingConfig::default(),
            sources: SourcesConfig::default(),
            redaction: RedactionConfig::default(),
            health: HealthConfig::default(),
            retention_policies: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse TOML from '{path}'"))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow!("server.port cannot be 0"));
        }
        if self.server.host.trim().is_empty() {
            return Err(anyhow!("server.host cannot be empty"));
        }
        if self.index.base_dir.trim().is_empty() {
            return Err(anyhow!("index.base_dir cannot be empty"));
        }
        if self.index.max_active_partitions == 0 {
            return Err(anyhow!("index.max_active_partitions cannot be 0"));
        }
        if self.buffer.max_size == 0 {
            return Err(anyhow!("buffer.max_size cannot be 0"));
        }
        if self.buffer.flush_interval_ms == 0 {
            return Err(anyhow!("buffer.flush_interval_ms cannot be 0"));
        }
        if self.search_cache.enabled && self.search_cache.max_size == 0 {
            return Err(anyhow!(
                "search_cache.max_size cannot be 0 when the cache is enabled"
            ));
        }
        if self.archive.compression_level > 9 {
            return Err(anyhow!("archive.compression_level must be between 0 and 9"));
        }
        if self.alarm.evaluation_interval_secs == 0 {
            return Err(anyhow!("alarm.evaluation_interval_secs cannot be 0"));
        }
        if self.high_availability.enabled {
            if self.high_availability.heartbeat_interval_ms == 0 {
                return Err(anyhow!(
                    "high_availability.heartbeat_interval_ms cannot be 0"
                ));
            }
            if self.high_availability.heartbeat_timeout_ms
                <= self.high_availability.heartbeat_interval_ms as i64
            {
                return Err(anyhow!(
                    "high_availability.heartbeat_timeout_ms must exceed the heartbeat interval"
                ));
            }
            if self.high_availability.node_url.as_deref().is_none_or(str::is_empty) {
                return Err(anyhow!(
                    "high_availability.node_url is required when HA is enabled"
                ));
            }
        }
        if self.sharding.enabled && self.sharding.number_of_shards == 0 {
            return Err(anyhow!("sharding.number_of_shards cannot be 0"));
        }
        for listener in &self.sources.syslog {
            if listener.port == 0 {
                return Err(anyhow!("syslog listener port cannot be 0"));
            }
        }
        for policy in &self.retention_policies {
            if policy.name.trim().is_empty() {
                return Err(anyhow!("retention policy name cannot be empty"));
            }
            if policy.max_age_days == 0 {
                return Err(anyhow!(
                    "retention policy '{}': max_age_days cannot be 0",
                    policy.name
                ));
            }
        }
        for field in &self.index.fields {
            if field.name.trim().is_empty() {
                return Err(anyhow!("custom field name cannot be empty"));
            }
        }
        Ok(())
    }
}
