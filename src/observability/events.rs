//! Observable events emitted by the store and the pool
//!
//! Events are explicit and typed; the logger receives `Event::as_str()`.

use std::fmt;

/// Observable events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Store lifecycle
    /// Connection validated its directory
    StoreConnected,
    /// Connection closed
    StoreClosed,
    /// Table file lazily created by a mutation
    TableCreated,
    /// Table file removed
    TableDropped,

    // Mutations
    /// Mutation committed to disk
    MutationApplied,
    /// Mutation failed, file left untouched
    MutationFailed,
    /// Text header extended in loose mode
    HeaderRewritten,
    /// Cross-process lock not acquired in time
    LockTimeout,

    // Queries
    /// Cursor hit an error and became sticky
    CursorErrored,

    // Pool
    /// New backend handle created
    PoolItemCreated,
    /// Handle force-released by the reaper
    PoolItemReleased,
    /// Idle handle closed by the reaper
    PoolItemClosed,
    /// Acquisition timed out
    PoolExhausted,
    /// Whole pool closed
    PoolClosed,
}

impl Event {
    /// Returns the event name as logged
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::StoreConnected => "STORE_CONNECTED",
            Event::StoreClosed => "STORE_CLOSED",
            Event::TableCreated => "TABLE_CREATED",
            Event::TableDropped => "TABLE_DROPPED",
            Event::MutationApplied => "MUTATION_APPLIED",
            Event::MutationFailed => "MUTATION_FAILED",
            Event::HeaderRewritten => "HEADER_REWRITTEN",
            Event::LockTimeout => "LOCK_TIMEOUT",
            Event::CursorErrored => "CURSOR_ERRORED",
            Event::PoolItemCreated => "POOL_ITEM_CREATED",
            Event::PoolItemReleased => "POOL_ITEM_RELEASED",
            Event::PoolItemClosed => "POOL_ITEM_CLOSED",
            Event::PoolExhausted => "POOL_EXHAUSTED",
            Event::PoolClosed => "POOL_CLOSED",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
