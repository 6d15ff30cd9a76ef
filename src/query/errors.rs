//! Query engine errors
//!
//! Error codes:
//! - FLEX_FIELD_NOT_FOUND
//! - FLEX_TYPE_MISMATCH
//! - FLEX_UNKNOWN_OPERATION
//! - FLEX_INVALID_FILTER

use thiserror::Error;

/// Result type for filter, aggregation and sort operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised by the pure query engines
#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    /// A referenced field is absent from a record
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// A value could not be interpreted as the required type
    #[error("type mismatch on {field}: expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Operator name not recognised
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Filter shape is invalid (e.g. `Not` without a child)
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

impl QueryError {
    pub(crate) fn mismatch(
        field: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        QueryError::TypeMismatch {
            field: field.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::FieldNotFound(_) => "FLEX_FIELD_NOT_FOUND",
            QueryError::TypeMismatch { .. } => "FLEX_TYPE_MISMATCH",
            QueryError::UnknownOperation(_) => "FLEX_UNKNOWN_OPERATION",
            QueryError::InvalidFilter(_) => "FLEX_INVALID_FILTER",
        }
    }
}
