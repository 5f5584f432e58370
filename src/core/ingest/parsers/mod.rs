// src/core/ingest/parsers/mod.rs

//! Log line classification. Each parser attempts to recognize one concrete
//! format and returns `None` when the line does not match, letting the chain
//! move on to the next candidate. The chain itself is infallible: a line no
//! parser claims becomes a raw record.

use crate::core::model::{LogLevel, LogRecord};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeZone, Utc};

pub mod apache;
pub mod nginx;
pub mod syslog;

/// A single format recognizer. Implementations are pure and cheap to call;
/// regexes are compiled once per process.
pub trait LineParser: Send + Sync {
    /// A short identifier recorded in `metadata.log_format`.
    fn name(&self) -> &'static str;

    /// Attempts to parse `line`. `None` means "not my format".
    fn parse(&self, line: &str, source: &str) -> Option<LogRecord>;
}

/// The ordered set of parsers tried against every incoming line.
pub struct ParserChain {
    parsers: Vec<Box<dyn LineParser>>,
}

impl Default for ParserChain {
    fn default() -> Self {
        Self {
            parsers: vec![
                Box::new(nginx::NginxCombinedParser),
                Box::new(nginx::NginxCommonParser),
                Box::new(nginx::NginxErrorParser),
                Box::new(apache::ApacheCombinedParser),
                Box::new(apache::ApacheCommonParser),
                Box::new(apache::ApacheErrorParser),
            ],
        }
    }
}

impl ParserChain {
    /// Classifies a raw line. Unrecognized formats yield a raw record with
    /// `level = UNKNOWN` and the line preserved verbatim in `raw_content`.
    pub fn parse(&self, line: &str, source: &str) -> LogRecord {
        for parser in &self.parsers {
            if let Some(record) = parser.parse(line, source) {
                return record;
            }
        }
        generic_record(line, source)
    }
}

/// Fallback for lines no structured parser recognizes. A best-effort scan
/// still picks up a level token so plain application logs stay filterable.
fn generic_record(line: &str, source: &str) -> LogRecord {
    let mut record = LogRecord::new(line.to_string(), source, line.to_string());
    record.level = scan_level_token(line);
    record
}

/// Looks for a bare or bracketed severity word anywhere in the line.
fn scan_level_token(line: &str) -> LogLevel {
    for token in line.split(|c: char| !c.is_ascii_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        match token.to_ascii_uppercase().as_str() {
            "ERROR" | "FATAL" | "SEVERE" => return LogLevel::Error,
            "WARN" | "WARNING" => return LogLevel::Warn,
            "INFO" => return LogLevel::Info,
            "DEBUG" | "TRACE" => return LogLevel::Debug,
            _ => {}
        }
    }
    LogLevel::Unknown
}

/// Error-log token mapping shared by the nginx and apache error parsers.
/// Anything at crit or above collapses to ERROR for alerting purposes.
pub(crate) fn error_log_level(token: &str) -> LogLevel {
    match token.to_ascii_lowercase().as_str() {
        "emerg" | "alert" | "crit" | "error" | "fatal" | "severe" => LogLevel::Error,
        "warn" | "warning" | "notice" => LogLevel::Warn,
        "info" => LogLevel::Info,
        "debug" | "trace" => LogLevel::Debug,
        _ => LogLevel::Unknown,
    }
}

// --- Timestamp helpers -----------------------------------------------------

/// Apache / CLF style: `10/Oct/2023:13:55:36 +0000`.
pub(crate) fn parse_clf_timestamp(value: &str) -> Option<i64> {
    DateTime::<FixedOffset>::parse_from_str(value, "%d/%b/%Y:%H:%M:%S %z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Nginx error log style: `2023/10/10 13:55:36` (no zone, taken as UTC).
pub(crate) fn parse_nginx_error_timestamp(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, "%Y/%m/%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// Apache error log style: `Wed Oct 11 14:32:52 2000`.
pub(crate) fn parse_apache_error_timestamp(value: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(value, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// RFC3164 style: `Oct 11 22:14:15`. The format has no year; the current
/// wall-clock year is assumed at parse time.
pub(crate) fn parse_rfc3164_timestamp(value: &str) -> Option<i64> {
    let year = Utc::now().year();
    let with_year = format!("{year} {value}");
    NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive).timestamp_millis())
}

/// RFC5424 carries an ISO-8601 timestamp.
pub(crate) fn parse_rfc5424_timestamp(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clf_timestamp() {
        let ts = parse_clf_timestamp("10/Oct/2023:13:55:36 +0000").unwrap();
        assert_eq!(ts, 1_696_946_136_000);
    }

    #[test]
    fn rfc3164_timestamp_assumes_current_year() {
        let ts = parse_rfc3164_timestamp("Oct 11 22:14:15").unwrap();
        let parsed = chrono::DateTime::from_timestamp_millis(ts).unwrap();
        assert_eq!(parsed.year(), Utc::now().year());
    }

    #[test]
    fn unknown_line_becomes_raw_record() {
        let chain = ParserChain::default();
        let record = chain.parse("completely unstructured text", "app.log");
        assert_eq!(record.level, LogLevel::Unknown);
        assert_eq!(record.raw_content, "completely unstructured text");
        assert!(record.metadata.is_empty());
    }

    #[test]
    fn generic_record_detects_level_word() {
        let chain = ParserChain::default();
        let record = chain.parse("2023-01-01 ERROR something broke", "app.log");
        assert_eq!(record.level, LogLevel::Error);
    }
}
