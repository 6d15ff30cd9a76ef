//! Data model: values, records and field access
//!
//! A [`Record`] is a map of field name to [`Value`]. Names are matched
//! case-insensitively and may be dotted paths into nested records.
//! [`FieldAccessor`] abstracts field access so the query engines accept
//! either records or raw JSON objects.

mod accessor;
mod errors;
#[allow(clippy::module_inception)]
mod record;
mod value;

pub use accessor::FieldAccessor;
pub use errors::RecordError;
pub use record::Record;
pub use value::{format_timestamp, Value, ValueKind};
