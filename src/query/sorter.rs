//! Multi-key record sorting
//!
//! Sorting is stable. Keys are compared in order, which gives the same
//! result as stable single-key passes applied from the last key to the
//! first. The comparator for each key is chosen from the value type of the
//! first record; every other record must hold the same type.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use crate::record::{FieldAccessor, Value, ValueKind};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }

    /// Parses `field` (ascending) or `-field` (descending)
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(spec),
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Asc => f.write_str(&self.field),
            SortDirection::Desc => write!(f, "-{}", self.field),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Int(i64),
    Float(f64),
    Text(String),
    Time(DateTime<Utc>),
}

impl SortValue {
    fn cmp(&self, other: &SortValue) -> Ordering {
        match (self, other) {
            (SortValue::Int(a), SortValue::Int(b)) => a.cmp(b),
            (SortValue::Float(a), SortValue::Float(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            (SortValue::Time(a), SortValue::Time(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

fn sort_value(field: &str, value: &Value, expected: ValueKind) -> QueryResult<SortValue> {
    if value.kind() != expected {
        return Err(QueryError::mismatch(field, expected.name(), value.kind().name()));
    }
    match value {
        Value::Int(i) => Ok(SortValue::Int(*i)),
        Value::Float(f) => Ok(SortValue::Float(*f)),
        Value::String(s) => Ok(SortValue::Text(s.clone())),
        Value::Timestamp(t) => Ok(SortValue::Time(*t)),
        other => Err(QueryError::mismatch(
            field,
            "int, float, string or timestamp",
            other.kind().name(),
        )),
    }
}

/// Sorts `records` in place by `keys` (`"field"` or `"-field"`).
pub fn sort_by<A: FieldAccessor, S: AsRef<str>>(records: &mut [A], keys: &[S]) -> QueryResult<()> {
    let keys: Vec<SortKey> = keys.iter().map(|k| SortKey::parse(k.as_ref())).collect();
    sort_records(records, &keys)
}

/// Sorts `records` in place by parsed sort keys.
///
/// Errors leave `records` untouched.
pub fn sort_records<A: FieldAccessor>(records: &mut [A], keys: &[SortKey]) -> QueryResult<()> {
    if records.is_empty() || keys.is_empty() {
        return Ok(());
    }

    let mut columns: Vec<Vec<SortValue>> = Vec::with_capacity(keys.len());
    for key in keys {
        let first = records[0]
            .field(&key.field)
            .ok_or_else(|| QueryError::FieldNotFound(key.field.clone()))?;
        let expected = first.kind();
        let mut column = Vec::with_capacity(records.len());
        for record in records.iter() {
            let value = record
                .field(&key.field)
                .ok_or_else(|| QueryError::FieldNotFound(key.field.clone()))?;
            column.push(sort_value(&key.field, &value, expected)?);
        }
        columns.push(column);
    }

    let mut order: Vec<usize> = (0..records.len()).collect();
    order.sort_by(|&a, &b| {
        for (key, column) in keys.iter().zip(&columns) {
            let ord = column[a].cmp(&column[b]);
            let ord = match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    apply_permutation(records, &order);
    Ok(())
}

/// Rearranges `items` so that position `i` holds the old `items[order[i]]`
fn apply_permutation<T>(items: &mut [T], order: &[usize]) {
    let mut placed = vec![false; items.len()];
    for start in 0..items.len() {
        if placed[start] {
            continue;
        }
        let mut current = start;
        placed[current] = true;
        while order[current] != start {
            let next = order[current];
            items.swap(current, next);
            current = next;
            placed[current] = true;
        }
    }
}
