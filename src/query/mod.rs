//! Query engines
//!
//! Pure functions over records:
//! - [`evaluate`]: filter predicates
//! - [`aggregate`]: grouping and numeric folds
//! - [`sort_by`]: stable multi-key ordering
//!
//! [`QueryPlan`] ties them together for the cursor.

mod aggregate;
mod errors;
mod filter;
mod plan;
mod sorter;

pub use aggregate::{aggregate, AggrItem, AggrOp};
pub use errors::{QueryError, QueryResult};
pub use filter::{evaluate, CompareOp, Filter};
pub use plan::QueryPlan;
pub use sorter::{sort_by, sort_records, SortDirection, SortKey};
