//! Pool errors
//!
//! Error codes:
//! - FLEX_POOL_EXHAUSTED: no handle became available in time
//! - FLEX_POOL_FACTORY: the factory failed to build a handle
//! - FLEX_POOL_CLOSED: the pool was closed
//! - FLEX_POOL_CONFIG: invalid pool settings

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    /// Carries the counts at the moment acquisition gave up
    #[error(
        "no pool item available after {waited_ms}ms (items: {count}, idle: {idle}, size: {size})"
    )]
    Exhausted {
        waited_ms: u128,
        count: usize,
        idle: usize,
        size: usize,
    },

    #[error("unable to create pool item: {0}")]
    Factory(String),

    #[error("pool is closed")]
    Closed,

    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),
}

impl PoolError {
    pub fn code(&self) -> &'static str {
        match self {
            PoolError::Exhausted { .. } => "FLEX_POOL_EXHAUSTED",
            PoolError::Factory(_) => "FLEX_POOL_FACTORY",
            PoolError::Closed => "FLEX_POOL_CLOSED",
            PoolError::InvalidConfig(_) => "FLEX_POOL_CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_reports_counts() {
        let err = PoolError::Exhausted {
            waited_ms: 40,
            count: 2,
            idle: 0,
            size: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("items: 2"));
        assert!(msg.contains("idle: 0"));
        assert!(msg.contains("size: 2"));
        assert_eq!(err.code(), "FLEX_POOL_EXHAUSTED");
    }
}
