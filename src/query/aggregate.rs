//! Grouping and aggregation
//!
//! Records are bucketed by the textual rendering of their group-by values,
//! buckets kept in order of first appearance. Each aggregate item folds
//! one numeric field through a small reducer state.
//!
//! Numeric typing is decided per item before folding: a field that holds a
//! float in any record is reduced as `f64`, otherwise as `i64`.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use crate::record::{FieldAccessor, Record, Value};

/// Aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggrOp {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl AggrOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggrOp::Sum => "sum",
            AggrOp::Avg => "avg",
            AggrOp::Count => "count",
            AggrOp::Max => "max",
            AggrOp::Min => "min",
        }
    }
}

impl fmt::Display for AggrOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggrOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggrOp::Sum),
            "avg" => Ok(AggrOp::Avg),
            "count" => Ok(AggrOp::Count),
            "max" => Ok(AggrOp::Max),
            "min" => Ok(AggrOp::Min),
            _ => Err(QueryError::UnknownOperation(s.to_string())),
        }
    }
}

/// One aggregate column: `op(field) as alias`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggrItem {
    pub field: String,
    pub op: AggrOp,
    /// Output field name; defaults to `field`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl AggrItem {
    pub fn new(field: impl Into<String>, op: AggrOp) -> Self {
        Self {
            field: field.into(),
            op,
            alias: None,
        }
    }

    pub fn sum(field: impl Into<String>) -> Self {
        Self::new(field, AggrOp::Sum)
    }

    pub fn avg(field: impl Into<String>) -> Self {
        Self::new(field, AggrOp::Avg)
    }

    pub fn count(field: impl Into<String>) -> Self {
        Self::new(field, AggrOp::Count)
    }

    pub fn max(field: impl Into<String>) -> Self {
        Self::new(field, AggrOp::Max)
    }

    pub fn min(field: impl Into<String>) -> Self {
        Self::new(field, AggrOp::Min)
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Name of the output field
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn into_value(self) -> Value {
        match self {
            Number::Int(i) => Value::Int(i),
            Number::Float(f) => Value::Float(f),
        }
    }
}

/// Running state for one item within one group
#[derive(Debug, Clone)]
struct ReducerState {
    op: AggrOp,
    float: bool,
    acc: Option<Number>,
    count: i64,
}

impl ReducerState {
    fn new(op: AggrOp, float: bool) -> Self {
        Self {
            op,
            float,
            acc: None,
            count: 0,
        }
    }

    fn update(&mut self, n: Number) {
        let n = if self.float {
            match n {
                Number::Int(i) => Number::Float(i as f64),
                f => f,
            }
        } else {
            n
        };
        self.count += 1;

        self.acc = Some(match (self.op, self.acc, n) {
            (_, None, n) => n,
            (AggrOp::Sum | AggrOp::Avg, Some(Number::Int(a)), Number::Int(b)) => {
                Number::Int(a.saturating_add(b))
            }
            (AggrOp::Sum | AggrOp::Avg, Some(Number::Float(a)), Number::Float(b)) => {
                Number::Float(a + b)
            }
            (AggrOp::Max, Some(Number::Int(a)), Number::Int(b)) => Number::Int(a.max(b)),
            (AggrOp::Max, Some(Number::Float(a)), Number::Float(b)) => Number::Float(a.max(b)),
            (AggrOp::Min, Some(Number::Int(a)), Number::Int(b)) => Number::Int(a.min(b)),
            (AggrOp::Min, Some(Number::Float(a)), Number::Float(b)) => Number::Float(a.min(b)),
            (_, Some(acc), _) => acc,
        });
    }

    fn finish(&self) -> Value {
        let zero = if self.float {
            Number::Float(0.0)
        } else {
            Number::Int(0)
        };
        let result = match self.op {
            AggrOp::Count => {
                if self.float {
                    Number::Float(self.count as f64)
                } else {
                    Number::Int(self.count)
                }
            }
            AggrOp::Avg => match self.acc {
                Some(Number::Int(sum)) if self.count > 0 => Number::Int(sum / self.count),
                Some(Number::Float(sum)) if self.count > 0 => {
                    Number::Float(sum / self.count as f64)
                }
                _ => zero,
            },
            _ => self.acc.unwrap_or(zero),
        };
        result.into_value()
    }
}

fn numeric<A: FieldAccessor + ?Sized>(record: &A, field: &str) -> QueryResult<Number> {
    let value = record
        .field(field)
        .ok_or_else(|| QueryError::FieldNotFound(field.to_string()))?;
    match value.as_ref() {
        Value::Int(i) => Ok(Number::Int(*i)),
        Value::Float(f) => Ok(Number::Float(*f)),
        other => Err(QueryError::mismatch(field, "number", other.kind().name())),
    }
}

const KEY_SEPARATOR: char = '\u{1f}';

fn group_key<A: FieldAccessor + ?Sized>(record: &A, group_by: &[String]) -> String {
    let mut key = String::new();
    for (i, field) in group_by.iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        if let Some(v) = record.field(field) {
            key.push_str(&v.to_text());
        }
    }
    key
}

struct Group {
    head: Record,
    states: Vec<ReducerState>,
}

/// Groups `records` by `group_by` and folds every item per group.
///
/// Returns one record per group, in order of first appearance, holding the
/// group-by fields followed by one field per item. An empty `group_by`
/// yields a single group; empty input yields no records.
pub fn aggregate<A: FieldAccessor>(
    records: &[A],
    items: &[AggrItem],
    group_by: &[String],
) -> QueryResult<Vec<Record>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    // typing pass, also surfaces missing and non-numeric fields
    let mut float_items = vec![false; items.len()];
    for record in records {
        for (i, item) in items.iter().enumerate() {
            if let Number::Float(_) = numeric(record, &item.field)? {
                float_items[i] = true;
            }
        }
    }

    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let key = group_key(record, group_by);
        let slot = match index.get(&key) {
            Some(&slot) => slot,
            None => {
                let mut head = Record::new();
                for field in group_by {
                    let name = record.resolve_path(field).unwrap_or_else(|| field.clone());
                    let value = record.field(field).map(|v| v.into_owned()).unwrap_or_default();
                    head.set_path(&name, value);
                }
                let states = items
                    .iter()
                    .zip(&float_items)
                    .map(|(item, &float)| ReducerState::new(item.op, float))
                    .collect();
                groups.push(Group { head, states });
                index.insert(key, groups.len() - 1);
                groups.len() - 1
            }
        };

        let group = &mut groups[slot];
        for (item, state) in items.iter().zip(group.states.iter_mut()) {
            state.update(numeric(record, &item.field)?);
        }
    }

    Ok(groups
        .into_iter()
        .map(|group| {
            let mut out = group.head;
            for (item, state) in items.iter().zip(&group.states) {
                out.set_path(item.output_name(), state.finish());
            }
            out
        })
        .collect())
}
