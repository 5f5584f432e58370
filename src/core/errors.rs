// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum LogLensError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Query parse error: {0}")]
    QueryParse(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// We wrap it in an Arc to allow for cheap, shared cloning.
impl Clone for LogLensError {
    fn clone(&self) -> Self {
        match self {
            LogLensError::Io(e) => LogLensError::Io(Arc::clone(e)),
            LogLensError::Validation(s) => LogLensError::Validation(s.clone()),
            LogLensError::NotFound(s) => LogLensError::NotFound(s.clone()),
            LogLensError::Conflict(s) => LogLensError::Conflict(s.clone()),
            LogLensError::QueryParse(s) => LogLensError::QueryParse(s.clone()),
            LogLensError::Index(s) => LogLensError::Index(s.clone()),
            LogLensError::Archive(s) => LogLensError::Archive(s.clone()),
            LogLensError::HttpClient(s) => LogLensError::HttpClient(s.clone()),
            LogLensError::Config(s) => LogLensError::Config(s.clone()),
            LogLensError::Internal(s) => LogLensError::Internal(s.clone()),
        }
    }
}

impl PartialEq for LogLensError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LogLensError::Io(e1), LogLensError::Io(e2)) => e1.to_string() == e2.to_string(),
            (LogLensError::Validation(s1), LogLensError::Validation(s2)) => s1 == s2,
            (LogLensError::NotFound(s1), LogLensError::NotFound(s2)) => s1 == s2,
            (LogLensError::Conflict(s1), LogLensError::Conflict(s2)) => s1 == s2,
            (LogLensError::QueryParse(s1), LogLensError::QueryParse(s2)) => s1 == s2,
            (LogLensError::Index(s1), LogLensError::Index(s2)) => s1 == s2,
            (LogLensError::Archive(s1), LogLensError::Archive(s2)) => s1 == s2,
            (LogLensError::HttpClient(s1), LogLensError::HttpClient(s2)) => s1 == s2,
            (LogLensError::Config(s1), LogLensError::Config(s2)) => s1 == s2,
            (LogLensError::Internal(s1), LogLensError::Internal(s2)) => s1 == s2,
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for LogLensError {
    fn from(e: std::io::Error) -> Self {
        LogLensError::Io(Arc::new(e))
    }
}

impl From<reqwest::Error> for LogLensError {
    fn from(e: reqwest::Error) -> Self {
        LogLensError::HttpClient(e.to_string())
    }
}

impl From<serde_json::Error> for LogLensError {
    fn from(e: serde_json::Error) -> Self {
        LogLensError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<uuid::Error> for LogLensError {
    fn from(e: uuid::Error) -> Self {
        LogLensError::Internal(format!("Failed to generate UUID: {e}"))
    }
}

impl From<regex::Error> for LogLensError {
    fn from(e: regex::Error) -> Self {
        LogLensError::QueryParse(format!("invalid regex: {e}"))
    }
}

impl From<zip::result::ZipError> for LogLensError {
    fn from(e: zip::result::ZipError) -> Self {
        LogLensError::Archive(e.to_string())
    }
}
