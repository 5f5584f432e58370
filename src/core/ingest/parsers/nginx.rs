// src/core/ingest/parsers/nginx.rs

//! Parsers for the nginx access (combined/common) and error log formats.

use super::{LineParser, error_log_level, parse_clf_timestamp, parse_nginx_error_timestamp};
use crate::core::model::{LogLevel, LogRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static COMBINED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+)(?: (?P<proto>[^"]+))?" (?P<status>\d{3}) (?P<size>\d+|-) "(?P<referer>[^"]*)" "(?P<agent>[^"]*)""#,
    )
    .expect("nginx combined pattern")
});

static COMMON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"^(?P<ip>\S+) \S+ (?P<user>\S+) \[(?P<time>[^\]]+)\] "(?P<method>\S+) (?P<path>\S+)(?: (?P<proto>[^"]+))?" (?P<status>\d{3}) (?P<size>\d+|-)\s*$"#,
    )
    .expect("nginx common pattern")
});

static ERROR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<time>\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}) \[(?P<level>\w+)\] (?P<pid>\d+)#(?P<tid>\d+): (?P<message>.*)$",
    )
    .expect("nginx error pattern")
});

/// Builds the shared access-log record from captured fields.
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

pub struct NginxCombinedParser;

impl LineParser for NginxCombinedParser {
    fn name(&self) -> &'static str {
        "nginx_combined"
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

pub struct NginxCommonParser;

impl LineParser for NginxCommonParser {
    fn name(&self) -> &'static str {
        "nginx_common"
    }

    fn parse(&self, line: &str, source: &str) -> Option<LogRecord> {
        let caps = COMMON_RE.captures(line)?;
        Some(access_record(&caps, line, source, self.name()))
    }
}

pub struct NginxErrorParser;

impl LineParser for NginxErrorParser {
    fn name(&self) -> &'static str {
        "nginx_error"
    }

    fn parse(&self, line: &str, source: &str) -> Option<LogRecord> {
        let caps = ERROR_RE.captures(line)?;
        let message = caps["message"].to_string();

        let mut record = LogRecord::new(message, source, line.to_string());
        record.level = error_log_level(&caps["level"]);
        record.record_time = parse_nginx_error_timestamp(&caps["time"]);
        record
            .metadata
            .insert("log_format".into(), self.name().into());
        record.metadata.insert("pid".into(), caps["pid"].into());
        record.metadata.insert("tid".into(), caps["tid"].into());

        // Error lines often carry a trailing `client: <ip>` annotation.
        if let Some(client) = caps["message"]
            .split("client: ")
            .nth(1)
            .and_then(|rest| rest.split([',', ' ']).next())
            && !client.is_empty()
        {
            record.metadata.insert("client_ip".into(), client.into());
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_combined_line() {
        let line = r#"203.0.113.7 - alice [10/Oct/2023:13:55:36 +0000] "GET /index.html HTTP/1.1" 200 2326 "http://example.com/" "Mozilla/5.0""#;
        let record = NginxCombinedParser.parse(line, "access.log").unwrap();
        assert_eq!(record.level, LogLevel::Info);
        assert_eq!(record.metadata["log_format"], "nginx_combined");
        assert_eq!(record.metadata["ip_address"], "203.0.113.7");
        assert_eq!(record.metadata["user_agent"], "Mozilla/5.0");
        assert_eq!(record.metadata["remote_user"], "alice");
        assert!(record.record_time.is_some());
    }

    #[test]
    fn common_line_does_not_match_combined() {
        let line = r#"192.168.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 200 10"#;
        assert!(NginxCombinedParser.parse(line, "access.log").is_none());
        let record = NginxCommonParser.parse(line, "access.log").unwrap();
        assert_eq!(record.metadata["log_format"], "nginx_common");
        assert_eq!(record.metadata["method"], "GET");
        assert_eq!(record.metadata["status_code"], "200");
    }

    #[test]
    fn server_errors_map_to_error_level() {
        let line = r#"192.168.1.1 - - [10/Oct/2023:13:55:36 +0000] "POST /api HTTP/1.1" 502 0"#;
        let record = NginxCommonParser.parse(line, "access.log").unwrap();
        assert_eq!(record.level, LogLevel::Error);
    }

    #[test]
    fn parses_error_line_with_client() {
        let line = "2023/10/10 13:55:36 [error] 1234#0: *5 connect() failed, client: 10.0.0.9, server: example.com";
        let record = NginxErrorParser.parse(line, "error.log").unwrap();
        assert_eq!(record.level, LogLevel::Error);
        assert_eq!(record.metadata["client_ip"], "10.0.0.9");
        assert_eq!(record.metadata["pid"], "1234");
    }
}
