// src/core/index/fields.rs

//! Per-deployment custom field configuration. A field config controls how a
//! `custom_<name>` metadata entry is treated by the index: whether it is
//! indexed at all, whether the stored value is kept, and whether text values
//! are tokenized in addition to the exact term.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Date,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default = "default_true")]
    pub indexed: bool,
    #[serde(default = "default_true")]
    pub stored: bool,
    #[serde(default)]
    pub tokenized: bool,
}

fn default_true() -> bool {
    true
}

/// Lookup table from field name to its configuration, shared read-only by
/// every partition.
#[derive(Debug, Default)]
pub struct FieldRegistry {
    fields: HashMap<String, FieldConfig>,
}

impl FieldRegistry {
    pub fn new(configs: Vec<FieldConfig>) -> Self {
        let fields = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.get(name)
    }

    /// Whether `custom_<name>` should receive an exact term entry.
    pub fn is_indexed(&self, name: &str) -> bool {
        self.fields.get(name).is_none_or(|c| c.indexed)
    }

    /// Whether `custom_<name>` text should additionally be tokenized.
    pub fn is_tokenized(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|c| c.tokenized && c.field_type == FieldType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconfigured_fields_default_to_indexed_untokenized() {
        let registry = FieldRegistry::default();
        assert!(registry.is_indexed("anything"));
        assert!(!registry.is_tokenized("anything"));
    }

    #[test]
    fn tokenized_requires_string_type() {
        let registry = FieldRegistry::new(vec![FieldConfig {
            name: "latency".into(),
            field_type: FieldType::Number,
            indexed: true,
            stored: true,
            tokenized: true,
        }]);
        assert!(!registry.is_tokenized("latency"));
    }
}
