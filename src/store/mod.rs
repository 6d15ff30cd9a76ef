//! Flat-file record store
//!
//! A [`Connection`] maps tables to files in one directory and exposes:
//! - queries through [`Cursor`]s built from a [`QueryPlan`](crate::query::QueryPlan)
//! - insert / update / delete / save, directly or as [`Command`]s
//!
//! Writes hold the connection mutex, then an exclusive advisory lock on
//! the table's `<file>.lock` sidecar, and replace the file atomically.

mod config;
mod connection;
mod cursor;
mod errors;
mod lock;
mod mutation;

pub use config::{StoreConfig, StoreFormat};
pub use connection::Connection;
pub use cursor::{Cursor, CursorState, Records};
pub use errors::{StoreError, StoreResult};
pub use mutation::{Command, CommandOutcome};
