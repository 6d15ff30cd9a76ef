//! Codec errors

use std::io;

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Failures reading or writing a table file
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CodecError {
    /// File content does not follow the format
    #[error("malformed {path}: {reason}")]
    Malformed { path: String, reason: String },

    /// Value cannot be written in the table's format
    #[error("cannot encode field {field}: {reason}")]
    Unencodable { field: String, reason: String },

    /// I/O failure, with the operation that failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl CodecError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn unencodable(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::Unencodable {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(context: impl Into<String>, err: &io::Error) -> Self {
        CodecError::Io(format!("{}: {}", context.into(), err))
    }

    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            CodecError::Malformed { .. } => "FLEX_CODEC_MALFORMED",
            CodecError::Unencodable { .. } => "FLEX_CODEC_UNENCODABLE",
            CodecError::Io(_) => "FLEX_CODEC_IO",
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::Io(err.to_string())
    }
}
