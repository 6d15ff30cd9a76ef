//! Connection pool
//!
//! A [`Pool`] leases out at most `size` handles built by an injected
//! factory. Any type implementing [`PoolBackend`] can be pooled, the
//! file-store [`Connection`](crate::store::Connection) included.
//!
//! ```ignore
//! use rowflex::observability::Logger;
//! use rowflex::pool::{Pool, PoolConfig};
//! use rowflex::store::{Connection, StoreConfig};
//!
//! let pool = Pool::new(
//!     PoolConfig::new(4),
//!     || Connection::open(StoreConfig::json("/data"), Logger::stdout()),
//!     Logger::stdout(),
//! )?;
//! let conn = pool.acquire()?;
//! conn.insert("users", &records)?;
//! ```

mod config;
mod errors;
#[allow(clippy::module_inception)]
mod pool;
mod reaper;

pub use config::PoolConfig;
pub use errors::{PoolError, PoolResult};
pub use pool::{ItemState, Pool, PoolBackend, PoolLease};
