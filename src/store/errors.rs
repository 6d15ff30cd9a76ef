//! Store errors
//!
//! Error codes:
//! - FLEX_LOCK_TIMEOUT: cross-process table lock not acquired in time
//! - FLEX_EOF: cursor has no record left
//! - FLEX_NO_TABLE / FLEX_NOT_CONNECTED / FLEX_NOT_A_DIRECTORY
//! - FLEX_STORE_IO / FLEX_INVALID_CONFIG
//! - query, codec and record errors keep their own codes

use thiserror::Error;

use crate::codec::CodecError;
use crate::query::QueryError;
use crate::record::RecordError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by connections and cursors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Record(#[from] RecordError),

    /// Another process held the table lock past the timeout
    #[error("lock on {path} not acquired after {waited_ms}ms")]
    LockTimeout { path: String, waited_ms: u128 },

    /// Cursor exhausted
    #[error("end of records")]
    Eof,

    /// Table name missing or not usable as a file name
    #[error("no such table: {0:?}")]
    NoTable(String),

    #[error("connection is not open")]
    NotConnected,

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Query(e) => e.code(),
            StoreError::Codec(e) => e.code(),
            StoreError::Record(e) => e.code(),
            StoreError::LockTimeout { .. } => "FLEX_LOCK_TIMEOUT",
            StoreError::Eof => "FLEX_EOF",
            StoreError::NoTable(_) => "FLEX_NO_TABLE",
            StoreError::NotConnected => "FLEX_NOT_CONNECTED",
            StoreError::NotADirectory(_) => "FLEX_NOT_A_DIRECTORY",
            StoreError::Io(_) => "FLEX_STORE_IO",
            StoreError::InvalidConfig(_) => "FLEX_INVALID_CONFIG",
        }
    }

    /// True for the end-of-cursor sentinel
    pub fn is_eof(&self) -> bool {
        matches!(self, StoreError::Eof)
    }
}
