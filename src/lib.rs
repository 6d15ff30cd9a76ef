//! rowflex - flat-file record store with a uniform query model and a
//! bounded connection pool
//!
//! - `record`: dynamic values and records
//! - `query`: filters, aggregation, sorting, query plans
//! - `codec`: JSON-array and delimited-text table files
//! - `store`: connections, cursors and mutations
//! - `pool`: leasing backend handles

pub mod codec;
pub mod observability;
pub mod pool;
pub mod query;
pub mod record;
pub mod store;

pub use pool::{Pool, PoolBackend, PoolConfig, PoolError, PoolLease};
pub use query::{AggrItem, AggrOp, Filter, QueryPlan};
pub use record::{Record, Value};
pub use store::{Command, CommandOutcome, Connection, Cursor, StoreConfig, StoreError};
