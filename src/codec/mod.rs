//! Table file codecs
//!
//! A codec turns one table file into a stream of [`Record`]s and back.
//! Two formats are provided:
//! - [`JsonCodec`]: a top-level JSON array of objects
//! - [`TextCodec`]: delimited text with a header line
//!
//! Every full rewrite goes through a temp file renamed over the target, so
//! a reader never observes a half-written table.

mod atomic;
mod errors;
mod json;
mod text;

use std::fmt;
use std::path::Path;

use crate::record::Record;

pub use errors::{CodecError, CodecResult};
pub use json::JsonCodec;
pub use text::{HeaderMode, QuotePair, TextCodec, TextConfig};

/// Lazy, finite, one-pass sequence of decoded records.
///
/// A decode error ends the stream: the error is yielded once and the
/// iterator returns `None` afterwards.
pub type RecordStream = Box<dyn Iterator<Item = CodecResult<Record>> + Send>;

/// Accepts the full replacement content of a table.
pub trait RecordSink {
    /// Atomically replaces the table with `records`
    fn commit(self: Box<Self>, records: &[Record]) -> CodecResult<()>;
}

/// A file format for tables
pub trait RecordCodec: Send + Sync + fmt::Debug {
    /// File extension used when none is configured
    fn default_extension(&self) -> &'static str;

    /// Creates an empty table at `path` unless one exists
    fn create_empty(&self, path: &Path) -> CodecResult<()>;

    /// Opens a read stream. A missing file reads as an empty table.
    fn open_read(&self, path: &Path) -> CodecResult<RecordStream>;

    /// Prepares a full rewrite of `path`
    fn open_write(&self, path: &Path) -> CodecResult<Box<dyn RecordSink>>;

    /// Adds `records` after the existing ones
    fn append(&self, path: &Path, records: &[Record]) -> CodecResult<()>;
}

/// Reads a whole table into memory
pub fn read_all(codec: &dyn RecordCodec, path: &Path) -> CodecResult<Vec<Record>> {
    codec.open_read(path)?.collect()
}
