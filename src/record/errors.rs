//! Record conversion errors

use thiserror::Error;

/// Failures converting between records and external representations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RecordError {
    /// The JSON value was not an object
    #[error("expected a JSON object, found {0}")]
    NotAnObject(String),

    /// serde could not map the record onto the requested type
    #[error("serialization failed: {0}")]
    Serde(String),
}

impl RecordError {
    /// Stable error code
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::NotAnObject(_) => "FLEX_RECORD_NOT_OBJECT",
            RecordError::Serde(_) => "FLEX_RECORD_SERDE",
        }
    }
}
