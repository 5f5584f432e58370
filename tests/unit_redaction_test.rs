// tests/unit_redaction_test.rs

use loglens::core::redaction::{DEFAULT_MASK, RedactionSet};
use std::collections::HashMap;

#[test]
fn test_multiple_patterns_apply_in_order() {
    let set = RedactionSet::new(
        &[],
        &[
            r"\b\d{3}-\d{2}-\d{4}\b".into(),          // SSN-shaped
            r"(email=)(\S+@\S+)".into(),              // keep the key, mask the value
        ],
    );
    let out = set.redact_line(
        "user 123-45-6789 email=jane@example.com logged in",
        DEFAULT_MASK,
    );
    assert_eq!(
        out,
        format!("user {DEFAULT_MASK} email={DEFAULT_MASK} logged in")
    );
}

#[test]
fn test_metadata_key_match_beats_value_patterns() {
    let set = RedactionSet::new(&["(?i)^password$".into()], &[r"\d+".into()]);
    let mut metadata = HashMap::new();
    metadata.insert("password".to_string(), "no digits here".to_string());
    metadata.insert("attempts".to_string(), "17".to_string());

    let out = set.redact_metadata_values(&metadata, "***");
    assert_eq!(out["password"], "***");
    assert_eq!(out["attempts"], "***");
}

#[test]
fn test_empty_set_is_identity() {
    let set = RedactionSet::default();
    assert!(set.is_empty());
    assert_eq!(set.redact_line("anything 123", "X"), "anything 123");
}

#[test]
fn test_refresh_is_atomic_swap() {
    let set = RedactionSet::new(&[], &["alpha".into()]);
    assert_eq!(set.redact_line("alpha beta", "X"), "X beta");

    set.refresh(&[], &["beta".into()]);
    assert_eq!(set.redact_line("alpha beta", "X"), "alpha X");
}
