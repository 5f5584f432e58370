// src/core/ingest/mod.rs

//! The ingestion pipeline: sources feed raw lines through the parser chain,
//! the redaction set scrubs sensitive values, and records land in the
//! buffer for batched indexing.

pub mod buffer;
pub mod cloud;
pub mod coordinator;
pub mod parsers;
pub mod scanner;
pub mod syslog_server;

use crate::core::model::LogRecord;
use crate::core::redaction::RedactionSet;
use buffer::LogBuffer;
use parsers::ParserChain;
use std::sync::Arc;

/// Shared by every source: line in, buffered record out.
pub struct IngestPipeline {
    parsers: ParserChain,
    buffer: Arc<LogBuffer>,
    redaction: Arc<RedactionSet>,
    mask: String,
}

impl IngestPipeline {
    pub fn new(buffer: Arc<LogBuffer>, redaction: Arc<RedactionSet>, mask: String) -> Self {
        Self {
            parsers: ParserChain::default(),
            buffer,
            redaction,
            mask,
        }
    }

    pub fn buffer(&self) -> &Arc<LogBuffer> {
        &self.buffer
    }

    /// Runs the parser chain without buffering the result.
    pub fn parse(&self, line: &str, source: &str) -> LogRecord {
        self.parsers.parse(line, source)
    }

    /// Parses, redacts, and buffers one raw line.
    pub async fn ingest_line(&self, line: &str, source: &str) {
        let record = self.parsers.parse(line, source);
        self.ingest_record(record).await;
    }

    /// Redacts and buffers an already-parsed record (used by the syslog and
    /// cloud paths, which parse with their own format knowledge).
    pub async fn ingest_record(&self, mut record: LogRecord) {
        if !self.redaction.is_empty() {
            record.message = self.redaction.redact_line(&record.message, &self.mask);
            record.raw_content = self.redaction.redact_line(&record.raw_content, &self.mask);
            record.metadata = self
                .redaction
                .redact_metadata_values(&record.metadata, &self.mask);
        }
        self.buffer.add(record).await;
    }
}
