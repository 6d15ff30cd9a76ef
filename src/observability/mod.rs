//! Observability for rowflex
//!
//! Structured JSON logging through an injected [`Logger`]. Nothing in the
//! crate logs through a global; constructors take the logger explicitly.
//!
//! ```ignore
//! use rowflex::observability::{Event, Logger};
//!
//! let logger = Logger::stdout();
//! logger.info(Event::TableCreated.as_str(), &[("table", "users")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{DiscardSink, LogSink, Logger, MemorySink, Severity, StdSink};
