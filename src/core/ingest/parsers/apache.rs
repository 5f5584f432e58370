// src/core/ingest/parsers/apache.rs

//! Parsers for the Apache httpd access (combined/common) and error log formats.
//!
//! The access formats are wire-identical to their nginx counterparts; which
//! parser claims a line is decided purely by chain order, and the winner's
//! name lands in `metadata.log_format`.

use super::{LineParser, error_log_level, parse_apache_error_timestamp, parse_clf_timestamp};
use crate::core::model::{LogLevel, LogRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static COMBINED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+)(?: (?P<proto>[^"]+))?" (?P<status>\d{3}) (?P<size>\d+|-) "(?P<referer>[^"]*)" "(?P<agent>[^"]*)""#,
    )
    .expect("apache combined pattern")
});

static COMMON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+)(?: (?P<proto>[^"]+))?" (?P<status>\d{3}) (?P<size>\d+|-)\s*$"#,
    )
    .expect("apache common pattern")
});

// `[Wed Oct 11 14:32:52 2000] [error] [pid 12345] [client 127.0.0.1] msg`
// The pid and client sections are optional; older httpd versions omit them.
static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[(?P<time>[A-Z][a-z]{2} [A-Z][a-z]{2} +\d{1,2} \d{2}:\d{2}:\d{2} \d{4})\] \[(?P<level>[a-z]+)\](?: \[pid (?P<pid>\d+)\])?(?: \[client (?P<client>[^\]]+)\])? (?P<message>.*)$",
    )
    .expect("apache error pattern")
});

fn access_record(
    caps: &regex::Captures<'_>,
    line: &str,
    source: &str,
    format: &'static str,
) -> LogRecord {
    let status: u16 = caps["status"].parse().unwrap_or(0);
    let method = &caps["method"];
    let path = &caps["path"];

    let mut record = LogRecord::new(format!("{method} {path} {status}"), source, line.to_string());
    record.level = LogLevel::from_http_status(status);
    record.record_time = parse_clf_timestamp(&caps["time"]);
    record.metadata.insert("log_format".into(), format.into());
    record.metadata.insert("ip_address".into(), caps["ip"].into());
    record.metadata.insert("method".into(), method.into());
    record.metadata.insert("path".into(), path.into());
    record.metadata.insert("status_code".into(), caps["status"].into());
    if let Some(proto) = caps.name("proto") {
        record.metadata.insert("protocol".into(), proto.as_str().into());
    }
    let user = &caps["user"];
    if user != "-" {
        record.metadata.insert("remote_user".into(), user.into());
    }
    let size = &caps["size"];
    if size != "-" {
        record.metadata.insert("response_size".into(), size.into());
    }
    record
}

pub struct ApacheCombinedParser;

impl LineParser for ApacheCombinedParser {
    fn name(&self) -> &'static str {
        "apache_combined"
    }

    fn parse(&self, line: &str, source: &str) -> Option<LogRecord> {
        let caps = COMBINED_RE.captures(line)?;
        let mut record = access_record(&caps, line, source, self.name());
        record
            .metadata
            .insert("referer".into(), caps["referer"].into());
        record
            .metadata
            .insert("user_agent".into(), caps["agent"].into());
        Some(record)
    }
}

pub struct ApacheCommonParser;

impl LineParser for ApacheCommonParser {
    fn name(&self) -> &'static str {
        "apache_common"
    }

    fn parse(&self, line: &str, source: &str) -> Option<LogRecord> {
        let caps = COMMON_RE.captures(line)?;
        Some(access_record(&caps, line, source, self.name()))
    }
}

pub struct ApacheErrorParser;

impl LineParser for ApacheErrorParser {
    fn name(&self) -> &'static str {
        "apache_error"
    }

    fn parse(&self, line: &str, source: &str) -> Option<LogRecord> {
        let caps = ERROR_RE.captures(line)?;
        let message = caps["message"].to_string();

        let mut record = LogRecord::new(message, source, line.to_string());
        record.level = error_log_level(&caps["level"]);
        record.record_time = parse_apache_error_timestamp(&caps["time"]);
        record
            .metadata
            .insert("log_format".into(), self.name().into());
        if let Some(pid) = caps.name("pid") {
            record.metadata.insert("pid".into(), pid.as_str().into());
        }
        if let Some(client) = caps.name("client") {
            // Strip an optional `:port` suffix.
            let ip = client.as_str().split(':').next().unwrap_or("");
            record.metadata.insert("client_ip".into(), ip.into());
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_error_line() {
        let line =
            "[Wed Oct 11 14:32:52 2000] [error] [pid 12345] [client 127.0.0.1] File does not exist: /x";
        let record = ApacheErrorParser.parse(line, "error.log").unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.metadata["log_format"], "apache_error");
        assert_eq!(record.metadata["client_ip"], "127.0.0.1");
        assert_eq!(record.metadata["pid"], "12345");
        assert_eq!(record.message, "File does not exist: /x");
        assert!(record.record_time.is_some());
    }

    #[test]
    fn parses_error_line_without_pid_or_client() {
        let line = "[Wed Oct 11 14:32:52 2000] [notice] caught SIGTERM, shutting down";
        let record = ApacheErrorParser.parse(line, "error.log").unwrap();
        assert_eq!(record.level, LogLevel::Warn);
        assert!(!record.metadata.contains_key("pid"));
    }

    #[test]
    fn error_client_port_is_stripped() {
        let line = "[Wed Oct 11 14:32:52 2000] [error] [client 10.1.2.3:52044] denied";
        let record = ApacheErrorParser.parse(line, "error.log").unwrap();
        assert_eq!(record.metadata["client_ip"], "10.1.2.3");
    }

    #[test]
    fn combined_access_line() {
        let line = r#"10.0.0.1 - - [10/Oct/2023:13:55:36 -0700] "GET /apache_pb.gif HTTP/1.0" 404 203 "-" "curl/8.0""#;
        let record = ApacheCombinedParser.parse(line, "access.log").unwrap();
        assert_eq!(record.level, LogLevel::Warn);
        assert_eq!(record.metadata["log_format"], "apache_combined");
    }
}
