//! Error types for percolate
//!
//! This module defines the error types shared by every crate in the workspace.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! # Propagation Policy
//!
//! - Per-item failures (query parsing) are collected into an update report
//!   and never abort the rest of a batch.
//! - Extraction failures are not surfaced at all: the extractor falls back to
//!   an ANY term and logs the failure.
//! - I/O failures abort the operation that hit them, never the monitor.
//! - `Closed` is returned by every operation after `Monitor::close()`.

use std::io;
use thiserror::Error;

/// Result type alias for percolate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for percolate
#[derive(Debug, Error)]
pub enum Error {
    /// A stored query's text failed to compile
    #[error("Parse error in query '{id}': {message}")]
    Parse {
        /// Id of the query that failed
        id: String,
        /// Parser message
        message: String,
    },

    /// A clause extractor failed
    ///
    /// Never returned by the public API; the extractor substitutes an ANY
    /// term instead. Exists so custom extractors have an error to return.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Failure reading or writing the query index or query log
    #[error("Index I/O error: {0}")]
    IndexIo(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persisted data failed validation
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Operation attempted after the monitor was closed
    #[error("Monitor is closed")]
    Closed,

    /// A match call ran past its caller-specified deadline
    #[error("Deadline exceeded after {completed} of {total} documents")]
    DeadlineExceeded {
        /// Documents fully processed before the deadline check failed
        completed: usize,
        /// Documents in the batch
        total: usize,
    },

    /// Configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build an `Error::Parse` from a query id and a parser error
    pub fn parse(id: impl Into<String>, err: ParseError) -> Self {
        Error::Parse {
            id: id.into(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// ParseError
// ============================================================================

/// Error produced by a [`QueryParser`](crate::parser::QueryParser)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{}", .message, offset_suffix(.position))]
pub struct ParseError {
    /// Human readable description
    pub message: String,
    /// Byte offset into the query text, if known
    pub position: Option<usize>,
}

impl ParseError {
    /// Create a parse error without position information
    pub fn new(message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            position: None,
        }
    }

    /// Create a parse error pointing at a byte offset
    pub fn at(position: usize, message: impl Into<String>) -> Self {
        ParseError {
            message: message.into(),
            position: Some(position),
        }
    }
}

fn offset_suffix(position: &Option<usize>) -> String {
    position.map(|p| format!(" at offset {}", p)).unwrap_or_default()
}
