// src/core/redaction.rs

//! The process-wide redaction set: sensitive-key detection plus value
//! patterns for masking. The set is refreshable at runtime; readers always
//! see a consistent compiled snapshot.

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_MASK: &str = "[REDACTED]";

#[derive(Default)]
struct CompiledSet {
    /// Regexes matched against metadata keys; a matching key's value is
    /// masked regardless of its content.
    keys: Vec<Regex>,
    /// Regexes matched against text; a pattern with at least two capture
    /// groups keeps group 1 and masks the rest, otherwise the whole match
    /// is replaced.
    patterns: Vec<Regex>,
}

#[derive(Default)]
pub struct RedactionSet {
    compiled: RwLock<Arc<CompiledSet>>,
}

impl RedactionSet {
    pub fn new(keys: &[String], patterns: &[String]) -> Self {
        let set = Self::default();
        set.refresh(keys, patterns);
        set
    }

    /// Recompiles the set. Invalid expressions are logged and skipped so a
    /// bad entry cannot disable the rest.
    pub fn refresh(&self, keys: &[String], patterns: &[String]) {
        let compile = |exprs: &[String], what: &str| -> Vec<Regex> {
            exprs
                .iter()
                .filter_map(|expr| match Regex::new(expr) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!("Skipping invalid redaction {} '{}': {}", what, expr, e);
                        None
                    }
                })
                .collect()
        };
        let next = CompiledSet {
            keys: compile(keys, "key"),
            patterns: compile(patterns, "pattern"),
        };
        *self.compiled.write() = Arc::new(next);
    }

    pub fn is_empty(&self) -> bool {
        let set = self.compiled.read().clone();
        set.keys.is_empty() && set.patterns.is_empty()
    }

    /// Applies every value pattern to a line of text.
    pub fn redact_line(&self, text: &str, mask: &str) -> String {
        let set = self.compiled.read().clone();
        let mut out = text.to_string();
        for pattern in &set.patterns {
            if pattern.captures_len() >= 3 {
                // Two or more capture groups: keep group 1, mask the rest.
                out = pattern
                    .replace_all(&out, |caps: &regex::Captures<'_>| {
                        format!("{}{}", caps.get(1).map_or("", |m| m.as_str()), mask)
                    })
                    .into_owned();
            } else {
                out = pattern.replace_all(&out, mask).into_owned();
            }
        }
        out
    }

    /// Applies value patterns to every metadata value and additionally masks
    /// values whose key matches a sensitive-key expression.
    pub fn redact_metadata_values(
        &self,
        metadata: &HashMap<String, String>,
        mask: &str,
    ) -> HashMap<String, String> {
        let set = self.compiled.read().clone();
        metadata
            .iter()
            .map(|(key, value)| {
                if set.keys.iter().any(|re| re.is_match(key)) {
                    (key.clone(), mask.to_string())
                } else {
                    (key.clone(), self.redact_line(value, mask))
                }
            })
            .collect()
    }
}
