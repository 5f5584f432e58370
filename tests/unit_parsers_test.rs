// tests/unit_parsers_test.rs

use loglens::core::ingest::parsers::ParserChain;
use loglens::core::ingest::parsers::syslog::parse_syslog_message;
use loglens::core::model::LogLevel;

#[test]
fn test_nginx_common_line_is_classified() {
    let chain = ParserChain::default();
    let line = r#"192.168.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 200 10"#;
    let record = chain.parse(line, "access.log");

    assert_eq!(record.level, LogLevel::Info);
    assert_eq!(record.metadata["log_format"], "nginx_common");
    assert_eq!(record.metadata["method"], "GET");
    assert_eq!(record.metadata["path"], "/a");
    assert_eq!(record.metadata["status_code"], "200");
    assert_eq!(record.metadata["ip_address"], "192.168.1.1");
    assert_eq!(record.source, "access.log");
    assert_eq!(record.raw_content, line);
    assert!(record.record_time.is_some());
}

#[test]
fn test_combined_line_beats_common() {
    let chain = ParserChain::default();
    let line = r#"192.168.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 200 10 "http://ref" "curl/8.0""#;
    let record = chain.parse(line, "access.log");
    assert_eq!(record.metadata["log_format"], "nginx_combined");
    assert_eq!(record.metadata["referer"], "http://ref");
    assert_eq!(record.metadata["user_agent"], "curl/8.0");
}

#[test]
fn test_apache_error_line() {
    let chain = ParserChain::default();
    let line =
        "[Wed Oct 11 14:32:52 2000] [error] [pid 12345] [client 127.0.0.1] File does not exist: /x";
    let record = chain.parse(line, "error.log");

    assert_eq!(record.level, LogLevel::Error);
    assert_eq!(record.metadata["log_format"], "apache_error");
    assert_eq!(record.metadata["client_ip"], "127.0.0.1");
}

#[test]
fn test_nginx_error_line() {
    let chain = ParserChain::default();
    let line = "2023/10/10 13:55:36 [warn] 99#0: *3 upstream timed out";
    let record = chain.parse(line, "error.log");
    assert_eq!(record.level, LogLevel::Warn);
    assert_eq!(record.metadata["log_format"], "nginx_error");
}

#[test]
fn test_http_status_drives_level() {
    let chain = ParserChain::default();
    let errors = r#"1.1.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 500 10"#;
    let warns = r#"1.1.1.1 - - [10/Oct/2023:13:55:36 +0000] "GET /a HTTP/1.1" 404 10"#;
    assert_eq!(chain.parse(errors, "a").level, LogLevel::Error);
    assert_eq!(chain.parse(warns, "a").level, LogLevel::Warn);
}

#[test]
fn test_rfc3164_datagram() {
    let record = parse_syslog_message("<34>Oct 11 22:14:15 myhost su: 'su root' failed", "syslog-udp:514");
    assert_eq!(record.level, LogLevel::Critical);
    assert_eq!(record.metadata["facility"], "4");
    assert_eq!(record.metadata["severity"], "2");
    assert_eq!(record.metadata["hostname"], "myhost");
    assert_eq!(record.source, "syslog-udp:514");
}

#[test]
fn test_priority_severity_table() {
    // Severity 0..=7 maps to EMERGENCY..DEBUG; facility is pri / 8.
    let cases = [
        (0, LogLevel::Emergency),
        (1, LogLevel::Alert),
        (2, LogLevel::Critical),
        (3, LogLevel::Error),
        (4, LogLevel::Warn),
        (5, LogLevel::Notice),
        (6, LogLevel::Info),
        (7, LogLevel::Debug),
    ];
    for (severity, expected) in cases {
        let pri = 8 + severity; // facility 1
        let line = format!("<{pri}>Oct 11 22:14:15 host app: msg");
        let record = parse_syslog_message(&line, "syslog-udp:514");
        assert_eq!(record.level, expected, "severity {severity}");
        assert_eq!(record.metadata["facility"], "1");
    }
}

#[test]
fn test_unknown_line_keeps_raw_content() {
    let chain = ParserChain::default();
    let record = chain.parse("::: gibberish :::", "weird.log");
    assert_eq!(record.level, LogLevel::Unknown);
    assert_eq!(record.raw_content, "::: gibberish :::");
    assert!(record.record_time.is_none());
}
