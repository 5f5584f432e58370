// src/core/model.rs

//! Core data model shared by ingestion, indexing, search, and alarming.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Severity of a log record. Parsed case-insensitively from the many
/// spellings found in the wild (`severe`, `warning`, `emerg`, ...); the
/// canonical names below are what gets indexed and displayed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, EnumString,
)]
#[strum(ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[strum(to_string = "EMERGENCY", serialize = "EMERG")]
    Emergency,
    #[strum(to_string = "ALERT")]
    Alert,
    #[strum(to_string = "CRITICAL", serialize = "CRIT")]
    Critical,
    #[strum(to_string = "ERROR", serialize = "ERR", serialize = "FATAL", serialize = "SEVERE")]
    Error,
    #[strum(to_string = "WARN", serialize = "WARNING")]
    Warn,
    #[strum(to_string = "NOTICE")]
    Notice,
    #[strum(to_string = "INFO")]
    Info,
    #[strum(to_string = "DEBUG")]
    Debug,
    #[strum(to_string = "TRACE")]
    Trace,
    #[strum(to_string = "UNKNOWN")]
    Unknown,
}

impl LogLevel {
    /// Maps a free-form level token to a canonical level, defaulting to `Unknown`.
    pub fn from_token(token: &str) -> Self {
        token.trim().parse().unwrap_or(LogLevel::Unknown)
    }

    /// Derives a level from an HTTP status code.
    pub fn from_http_status(status: u16) -> Self {
        if status >= 500 {
            LogLevel::Error
        } else if status >= 400 {
            LogLevel::Warn
        } else {
            LogLevel::Info
        }
    }

    /// Maps a syslog severity (0..=7) to a level.
    pub fn from_syslog_severity(severity: u8) -> Self {
        match severity {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warn,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

/// A single normalized log record. Immutable once indexed; identity is `id`,
/// while `(source, raw_content)` acts as the dedup key within a partition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub id: String,
    /// Epoch millis at which the record entered the pipeline.
    pub ingest_time: i64,
    /// Epoch millis parsed out of the line itself, when the format carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_time: Option<i64>,
    pub level: LogLevel,
    pub message: String,
    pub source: String,
    pub raw_content: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl LogRecord {
    /// Creates a record with a fresh id and the current wall clock as ingest time.
    pub fn new(message: impl Into<String>, source: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ingest_time: now_millis(),
            record_time: None,
            level: LogLevel::Unknown,
            message: message.into(),
            source: source.into(),
            raw_content: raw.into(),
            metadata: HashMap::new(),
        }
    }

    /// The timestamp used for time-range filtering and sort order: the parsed
    /// record time when present, otherwise the ingest time.
    pub fn effective_time(&self) -> i64 {
        self.record_time.unwrap_or(self.ingest_time)
    }
}

/// Helper to get the current system time in milliseconds since the UNIX epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
