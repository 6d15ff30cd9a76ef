//! Query plans
//!
//! A [`QueryPlan`] names a table and carries the whole read pipeline:
//! projection, filter, grouping, aggregation, ordering and the final
//! skip/take window.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::aggregate::AggrItem;
use super::errors::{QueryError, QueryResult};
use super::filter::Filter;
use crate::record::Value;

/// A read query against one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPlan {
    /// Target table name
    pub table: String,
    /// Output fields; empty means all
    pub select: Vec<String>,
    pub filter: Option<Filter>,
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggrItem>,
    /// Sort keys, `-field` for descending
    pub sort: Vec<String>,
    /// Results to drop from the front of the final set
    pub skip: usize,
    /// Maximum results; 0 means unbounded
    pub take: usize,
}

impl QueryPlan {
    /// Creates a plan reading every record of `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn group_by<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one aggregate column
    pub fn aggregate(mut self, item: AggrItem) -> Self {
        self.aggregates.push(item);
        self
    }

    pub fn sort_by<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.sort = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.skip = n;
        self
    }

    pub fn take(mut self, n: usize) -> Self {
        self.take = n;
        self
    }

    /// Returns a copy with `%name` filter variables substituted
    pub fn with_vars(&self, vars: &HashMap<String, Value>) -> Self {
        let mut plan = self.clone();
        plan.filter = self.filter.as_ref().map(|f| f.with_vars(vars));
        plan
    }

    /// True when records can stream straight from the file: no grouping,
    /// aggregation or ordering needs the full set.
    pub fn is_streaming(&self) -> bool {
        self.group_by.is_empty() && self.aggregates.is_empty() && self.sort.is_empty()
    }

    /// Checks the plan's shape before any file is touched
    pub fn validate(&self) -> QueryResult<()> {
        if let Some(filter) = &self.filter {
            validate_filter(filter)?;
        }
        if let Some(key) = self.sort.iter().find(|k| k.trim_start_matches('-').is_empty()) {
            return Err(QueryError::InvalidFilter(format!("empty sort key {:?}", key)));
        }
        if let Some(item) = self.aggregates.iter().find(|i| i.field.is_empty()) {
            return Err(QueryError::InvalidFilter(format!(
                "aggregate {} has no field",
                item.op
            )));
        }
        Ok(())
    }
}

fn validate_filter(filter: &Filter) -> QueryResult<()> {
    match filter {
        Filter::Compare { field, op, .. } if field.is_empty() => Err(QueryError::InvalidFilter(
            format!("{} comparison without a field", op),
        )),
        Filter::Range { field, .. } if field.is_empty() => Err(QueryError::InvalidFilter(
            "range without a field".to_string(),
        )),
        Filter::And(items) | Filter::Or(items) => items.iter().try_for_each(validate_filter),
        Filter::Not(inner) => validate_filter(inner),
        _ => Ok(()),
    }
}
