// src/core/index/text_query.rs

//! Builds the text clause of a search and evaluates it against records.
//! Plain queries are tokenized with AND semantics over the message and raw
//! content; queries that do not tokenize cleanly fall back to a substring
//! scan; regex mode matches message, raw content, and metadata values.

use crate::core::model::LogRecord;
use regex::Regex;
use tracing::debug;

/// The text portion of a search, independent of the time range.
#[derive(Debug, Clone)]
pub enum TextClause {
    /// No text constraint at all.
    Empty,
    /// AND over lowercased tokens.
    Tokens(Vec<String>),
    /// Case-insensitive substring fallback (`*q*` semantics).
    Substring(String),
    /// Field-level regex over message, raw content, and metadata values.
    Regex(Regex),
}

/// A fully-built search: text clause plus optional time bounds. Time bounds
/// apply to the record's effective timestamp (record time when parsed,
/// ingest time otherwise).
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub clause: TextClause,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl SearchQuery {
    pub fn build(
        query: &str,
        is_regex: bool,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Self {
        // A single trailing `^` is a UI artifact, not a boost marker.
        let trimmed = query.strip_suffix('^').unwrap_or(query).trim();

        let clause = if trimmed.is_empty() {
            TextClause::Empty
        } else if is_regex {
            match Regex::new(trimmed) {
                Ok(re) => TextClause::Regex(re),
                Err(e) => {
                    debug!("Invalid search regex '{}': {}. Falling back to substring.", trimmed, e);
                    TextClause::Substring(trimmed.to_lowercase())
                }
            }
        } else {
            let tokens = tokenize(trimmed);
            if tokens.is_empty() {
                TextClause::Substring(trimmed.to_lowercase())
            } else {
                TextClause::Tokens(tokens)
            }
        };

        Self {
            clause,
            start_time,
            end_time,
        }
    }

    /// An empty text clause with no time bounds matches nothing.
    pub fn is_vacuous(&self) -> bool {
        matches!(self.clause, TextClause::Empty)
            && self.start_time.is_none()
            && self.end_time.is_none()
    }

    /// Evaluates the time clause against a record.
    pub fn time_matches(&self, record: &LogRecord) -> bool {
        let ts = record.effective_time();
        if let Some(start) = self.start_time
            && ts < start
        {
            return false;
        }
        if let Some(end) = self.end_time
            && ts > end
        {
            return false;
        }
        true
    }

    /// Evaluates the text clause against a record, ignoring time bounds.
    pub fn text_matches(&self, record: &LogRecord) -> bool {
        match &self.clause {
            TextClause::Empty => true,
            TextClause::Tokens(tokens) => {
                let haystack = format!(
                    "{} {}",
                    record.message.to_lowercase(),
                    record.raw_content.to_lowercase()
                );
                let doc_tokens: std::collections::HashSet<&str> = haystack
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                    .collect();
                tokens.iter().all(|t| doc_tokens.contains(t.as_str()))
            }
            TextClause::Substring(needle) => {
                record.message.to_lowercase().contains(needle)
                    || record.raw_content.to_lowercase().contains(needle)
            }
            TextClause::Regex(re) => {
                re.is_match(&record.message)
                    || re.is_match(&record.raw_content)
                    || record.metadata.values().any(|v| re.is_match(v))
            }
        }
    }

    /// Full evaluation: text and time.
    pub fn matches(&self, record: &LogRecord) -> bool {
        self.text_matches(record) && self.time_matches(record)
    }
}

/// The tokenizer shared by indexing and querying: lowercase alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str, raw: &str) -> LogRecord {
        LogRecord::new(message, "test.log", raw)
    }

    #[test]
    fn tokens_require_all_terms() {
        let q = SearchQuery::build("GET index", false, None, None);
        assert!(q.matches(&record("GET /index.html 200", "raw")));
        assert!(!q.matches(&record("POST /index.html 200", "raw")));
    }

    #[test]
    fn trailing_caret_is_trimmed() {
        let q = SearchQuery::build("^", false, None, None);
        assert!(matches!(q.clause, TextClause::Empty));
        assert!(q.is_vacuous());
    }

    #[test]
    fn invalid_regex_falls_back_to_substring() {
        let q = SearchQuery::build("([", true, None, None);
        assert!(matches!(q.clause, TextClause::Substring(_)));
        assert!(q.matches(&record("prefix ([ suffix", "raw")));
    }

    #[test]
    fn regex_matches_metadata_values() {
        let q = SearchQuery::build(r"10\.0\.0\.\d+", true, None, None);
        let mut r = record("request served", "raw");
        r.metadata.insert("ip_address".into(), "10.0.0.7".into());
        assert!(q.matches(&r));
    }

    #[test]
    fn time_bounds_use_effective_time() {
        let q = SearchQuery::build("served", false, Some(100), Some(200));
        let mut r = record("request served", "raw");
        r.record_time = Some(150);
        assert!(q.matches(&r));
        r.record_time = Some(300);
        assert!(!q.matches(&r));
    }
}
