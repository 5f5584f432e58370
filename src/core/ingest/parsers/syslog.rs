// src/core/ingest/parsers/syslog.rs

//! RFC3164 and RFC5424 syslog message parsing, shared by the UDP and TCP
//! listeners. The priority value encodes `facility * 8 + severity`.

use super::{parse_rfc3164_timestamp, parse_rfc5424_timestamp};
use crate::core::model::{LogLevel, LogRecord};
use once_cell::sync::Lazy;
use regex::Regex;

// `<34>Oct 11 22:14:15 myhost su: 'su root' failed`
static RFC3164_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^<(?P<pri>\d{1,3})>(?P<time>[A-Z][a-z]{2} [ \d]\d \d{2}:\d{2}:\d{2}) (?P<host>\S+) (?P<rest>.*)$",
    )
    .expect("rfc3164 pattern")
});

// `<165>1 2003-10-11T22:14:15.003Z mymachine.example.com evntslog 1234 ID47 [sd@1 k="v"] msg`
static RFC5424_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^<(?P<pri>\d{1,3})>1 (?P<time>\S+) (?P<host>\S+) (?P<app>\S+) (?P<procid>\S+) (?P<msgid>\S+) (?P<sd>-|\[.*?\])\s*(?P<message>.*)$",
    )
    .expect("rfc5424 pattern")
});

/// Parses a syslog frame, trying RFC5424 first, then RFC3164. Frames with
/// no recognizable header still produce a record so nothing is dropped.
pub fn parse_syslog_message(line: &str, source: &str) -> LogRecord {
    if let Some(record) = parse_rfc5424(line, source) {
        return record;
    }
    if let Some(record) = parse_rfc3164(line, source) {
        return record;
    }

    let mut record = LogRecord::new(line.to_string(), source, line.to_string());
    record.level = LogLevel::Unknown;
    record
}

fn apply_priority(record: &mut LogRecord, pri: u16) {
    let facility = pri / 8;
    let severity = (pri % 8) as u8;
    record.level = LogLevel::from_syslog_severity(severity);
    record
        .metadata
        .insert("facility".into(), facility.to_string());
    record
        .metadata
        .insert("severity".into(), severity.to_string());
}

fn parse_rfc3164(line: &str, source: &str) -> Option<LogRecord> {
    let caps = RFC3164_RE.captures(line)?;
    let pri: u16 = caps["pri"].parse().ok()?;
    let rest = caps["rest"].to_string();

    // `tag: message` or `tag[pid]: message`; the tag is optional in practice.
    let (tag, message) = match rest.split_once(": ") {
        Some((tag, msg)) if !tag.contains(' ') => (Some(tag.to_string()), msg.to_string()),
        _ => (None, rest.clone()),
    };

    let mut record = LogRecord::new(message, source, line.to_string());
    apply_priority(&mut record, pri);
    record.record_time = parse_rfc3164_timestamp(&caps["time"]);
    record
        .metadata
        .insert("hostname".into(), caps["host"].into());
    record
        .metadata
        .insert("log_format".into(), "syslog_rfc3164".into());
    if let Some(tag) = tag {
        let app = tag.trim_end_matches(|c: char| c == ']' || c.is_ascii_digit() || c == '[');
        record.metadata.insert("app_name".into(), app.into());
    }
    Some(record)
}

fn parse_rfc5424(line: &str, source: &str) -> Option<LogRecord> {
    let caps = RFC5424_RE.captures(line)?;
    let pri: u16 = caps["pri"].parse().ok()?;

    let mut record = LogRecord::new(caps["message"].to_string(), source, line.to_string());
    apply_priority(&mut record, pri);
    record.record_time = parse_rfc5424_timestamp(&caps["time"]);
    record
        .metadata
        .insert("hostname".into(), caps["host"].into());
    record
        .metadata
        .insert("log_format".into(), "syslog_rfc5424".into());
    let app = &caps["app"];
    if app != "-" {
        record.metadata.insert("app_name".into(), app.into());
    }
    let procid = &caps["procid"];
    if procid != "-" {
        record.metadata.insert("proc_id".into(), procid.into());
    }
    let msgid = &caps["msgid"];
    if msgid != "-" {
        record.metadata.insert("msg_id".into(), msgid.into());
    }
    let sd = &caps["sd"];
    if sd != "-" {
        record.metadata.insert("structured_data".into(), sd.into());
    }
    Some(record)
}
