//! Filter predicates and their evaluation
//!
//! A [`Filter`] is a tree of comparisons joined by `And`, `Or` and `Not`.
//! Evaluation is pure: it reads fields through [`FieldAccessor`] and never
//! mutates the record or the filter.
//!
//! Comparisons work on the textual rendering of values:
//! - `Eq`/`Ne`: exact text equality
//! - `Contains`/`In`/`NotIn`: case-insensitive
//! - `StartsWith`/`EndsWith`: case-sensitive
//! - `Gt`/`Gte`/`Lt`/`Lte`: both sides parsed as `f64`

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{QueryError, QueryResult};
use crate::record::{FieldAccessor, Value};

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    /// Any keyword is a substring, ignoring case
    Contains,
    StartsWith,
    EndsWith,
    /// Equal to any listed value, ignoring case
    In,
    NotIn,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Contains => "contains",
            CompareOp::StartsWith => "starts_with",
            CompareOp::EndsWith => "ends_with",
            CompareOp::In => "in",
            CompareOp::NotIn => "not_in",
            CompareOp::Gt => "gt",
            CompareOp::Gte => "gte",
            CompareOp::Lt => "lt",
            CompareOp::Lte => "lte",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte
        )
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.to_ascii_lowercase().as_str() {
            "eq" => CompareOp::Eq,
            "ne" => CompareOp::Ne,
            "contains" => CompareOp::Contains,
            "starts_with" | "startwith" => CompareOp::StartsWith,
            "ends_with" | "endwith" => CompareOp::EndsWith,
            "in" => CompareOp::In,
            "not_in" | "nin" => CompareOp::NotIn,
            "gt" => CompareOp::Gt,
            "gte" => CompareOp::Gte,
            "lt" => CompareOp::Lt,
            "lte" => CompareOp::Lte,
            _ => return Err(QueryError::UnknownOperation(s.to_string())),
        };
        Ok(op)
    }
}

/// A filter predicate tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    /// `low <= field <= high`, both bounds inclusive
    Range {
        field: String,
        low: Value,
        high: Value,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Filter::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// Matches when any keyword occurs in the field text
    pub fn contains<V: Into<Value>>(field: impl Into<String>, keywords: Vec<V>) -> Self {
        Self::compare(field, CompareOp::Contains, Value::from(keywords))
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::StartsWith, Value::String(prefix.into()))
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::compare(field, CompareOp::EndsWith, Value::String(suffix.into()))
    }

    pub fn in_list<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::compare(field, CompareOp::In, Value::from(values))
    }

    pub fn not_in<V: Into<Value>>(field: impl Into<String>, values: Vec<V>) -> Self {
        Self::compare(field, CompareOp::NotIn, Value::from(values))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lte, value)
    }

    pub fn range(field: impl Into<String>, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        Filter::Range {
            field: field.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn and(items: Vec<Filter>) -> Self {
        Filter::And(items)
    }

    pub fn or(items: Vec<Filter>) -> Self {
        Filter::Or(items)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(item: Filter) -> Self {
        Filter::Not(Box::new(item))
    }

    /// Evaluates this filter against a record
    pub fn matches<A: FieldAccessor + ?Sized>(&self, record: &A) -> QueryResult<bool> {
        evaluate(record, self)
    }

    /// Returns a copy with `%name` tokens replaced from `vars`.
    ///
    /// A value that is exactly `%name` becomes the variable itself (any
    /// type). A string containing `%name` among other text has the token
    /// replaced by the variable when that variable is a string. Unknown
    /// tokens are left as-is.
    pub fn with_vars(&self, vars: &HashMap<String, Value>) -> Filter {
        match self {
            Filter::Compare { field, op, value } => Filter::Compare {
                field: field.clone(),
                op: *op,
                value: substitute(value, vars),
            },
            Filter::Range { field, low, high } => Filter::Range {
                field: field.clone(),
                low: substitute(low, vars),
                high: substitute(high, vars),
            },
            Filter::And(items) => Filter::And(items.iter().map(|f| f.with_vars(vars)).collect()),
            Filter::Or(items) => Filter::Or(items.iter().map(|f| f.with_vars(vars)).collect()),
            Filter::Not(inner) => Filter::Not(Box::new(inner.with_vars(vars))),
        }
    }
}

fn substitute(value: &Value, vars: &HashMap<String, Value>) -> Value {
    match value {
        Value::String(s) => {
            if let Some(var) = s.strip_prefix('%').and_then(|name| vars.get(name)) {
                return var.clone();
            }
            if !s.contains('%') {
                return value.clone();
            }
            // longest names first so `%ab` is not clobbered by `%a`
            let mut names: Vec<&String> = vars.keys().collect();
            names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            let mut out = s.clone();
            for name in names {
                if let Some(Value::String(text)) = vars.get(name) {
                    out = out.replace(&format!("%{}", name), text);
                }
            }
            Value::String(out)
        }
        Value::List(items) => Value::List(items.iter().map(|v| substitute(v, vars)).collect()),
        other => other.clone(),
    }
}

/// Evaluates `filter` against `record`.
///
/// `And` stops at the first false child, `Or` at the first true one. The
/// first child error is returned as-is.
pub fn evaluate<A: FieldAccessor + ?Sized>(record: &A, filter: &Filter) -> QueryResult<bool> {
    match filter {
        Filter::Compare { field, op, value } => {
            let actual = record
                .field(field)
                .ok_or_else(|| QueryError::FieldNotFound(field.clone()))?;
            compare(field, &actual, *op, value)
        }
        Filter::Range { field, low, high } => {
            let lower = evaluate(record, &Filter::gte(field.clone(), low.clone()))?;
            let upper = evaluate(record, &Filter::lte(field.clone(), high.clone()))?;
            Ok(lower && upper)
        }
        Filter::And(items) => {
            for item in items {
                if !evaluate(record, item)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(items) => {
            for item in items {
                if evaluate(record, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::Not(inner) => Ok(!evaluate(record, inner)?),
    }
}

fn compare(field: &str, actual: &Value, op: CompareOp, expected: &Value) -> QueryResult<bool> {
    let text = actual.to_text();

    if op.is_numeric() {
        let lhs = parse_number(field, &text)?;
        let rhs = parse_number(field, &expected.to_text())?;
        return Ok(match op {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            _ => lhs <= rhs,
        });
    }

    let matched = match op {
        CompareOp::Eq => text == expected.to_text(),
        CompareOp::Ne => text != expected.to_text(),
        CompareOp::Contains => {
            let haystack = text.to_lowercase();
            candidates(expected)
                .iter()
                .any(|k| haystack.contains(&k.to_lowercase()))
        }
        CompareOp::StartsWith => text.starts_with(&expected.to_text()),
        CompareOp::EndsWith => text.ends_with(&expected.to_text()),
        CompareOp::In => in_list(&text, expected),
        CompareOp::NotIn => !in_list(&text, expected),
        CompareOp::Gt | CompareOp::Gte | CompareOp::Lt | CompareOp::Lte => false,
    };
    Ok(matched)
}

/// A list contributes each element; any other value is a one-element list
fn candidates(expected: &Value) -> Vec<String> {
    match expected {
        Value::List(items) => items.iter().map(Value::to_text).collect(),
        other => vec![other.to_text()],
    }
}

fn in_list(text: &str, expected: &Value) -> bool {
    let needle = text.to_lowercase();
    candidates(expected)
        .iter()
        .any(|c| c.to_lowercase() == needle)
}

fn parse_number(field: &str, text: &str) -> QueryResult<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| QueryError::mismatch(field, "number", text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use serde_json::json;

    fn person() -> Record {
        Record::from_json(json!({
            "name": "Budi Santoso",
            "age": 30,
            "score": 7.5,
            "city": "Jakarta",
            "active": true
        }))
        .unwrap()
    }

    #[test]
    fn test_eq_is_exact_text() {
        let r = person();
        assert!(Filter::eq("age", 30).matches(&r).unwrap());
        assert!(Filter::eq("age", "30").matches(&r).unwrap());
        assert!(!Filter::eq("city", "jakarta").matches(&r).unwrap());
        assert!(Filter::ne("city", "jakarta").matches(&r).unwrap());
        assert!(Filter::eq("active", true).matches(&r).unwrap());
    }

    #[test]
    fn test_contains_any_keyword_ignoring_case() {
        let r = person();
        assert!(Filter::contains("name", vec!["xyz", "SANTOSO"]).matches(&r).unwrap());
        assert!(!Filter::contains("name", vec!["xyz"]).matches(&r).unwrap());
        assert!(!Filter::contains::<&str>("name", vec![]).matches(&r).unwrap());
    }

    #[test]
    fn test_prefix_suffix_case_sensitive() {
        let r = person();
        assert!(Filter::starts_with("name", "Budi").matches(&r).unwrap());
        assert!(!Filter::starts_with("name", "budi").matches(&r).unwrap());
        assert!(Filter::ends_with("name", "toso").matches(&r).unwrap());
    }

    #[test]
    fn test_in_and_not_in() {
        let r = person();
        assert!(Filter::in_list("city", vec!["bandung", "JAKARTA"]).matches(&r).unwrap());
        assert!(!Filter::not_in("city", vec!["bandung", "JAKARTA"]).matches(&r).unwrap());
        assert!(Filter::not_in("city", vec!["bandung"]).matches(&r).unwrap());
    }

    #[test]
    fn test_numeric_comparisons() {
        let r = person();
        assert!(Filter::gt("age", 29).matches(&r).unwrap());
        assert!(Filter::gte("age", 30).matches(&r).unwrap());
        assert!(!Filter::lt("age", 30).matches(&r).unwrap());
        assert!(Filter::lte("score", 7.5).matches(&r).unwrap());
        assert!(Filter::gt("score", "7").matches(&r).unwrap());
    }

    #[test]
    fn test_numeric_on_text_is_type_mismatch() {
        let err = Filter::gt("city", 3).matches(&person()).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_field_errors() {
        let err = Filter::eq("height", 1).matches(&person()).unwrap_err();
        assert_eq!(err, QueryError::FieldNotFound("height".into()));
    }

    #[test]
    fn test_field_names_are_case_insensitive() {
        assert!(Filter::eq("CITY", "Jakarta").matches(&person()).unwrap());
    }

    #[test]
    fn test_not_negates() {
        let r = person();
        let filters = vec![
            Filter::eq("age", 30),
            Filter::eq("age", 31),
            Filter::contains("name", vec!["budi"]),
            Filter::range("age", 10, 20),
            Filter::or(vec![Filter::eq("city", "x"), Filter::gt("age", 1)]),
        ];
        for f in filters {
            let plain = f.matches(&r).unwrap();
            assert_eq!(Filter::not(f).matches(&r).unwrap(), !plain);
        }
    }

    #[test]
    fn test_range_equals_gte_and_lte() {
        let records: Vec<Record> = (0..20)
            .map(|i| Record::new().with("n", i))
            .collect();
        let range = Filter::range("n", 5, 12);
        let pair = Filter::and(vec![Filter::gte("n", 5), Filter::lte("n", 12)]);
        for r in &records {
            assert_eq!(range.matches(r).unwrap(), pair.matches(r).unwrap());
        }
    }

    #[test]
    fn test_range_surfaces_errors_from_either_leg() {
        let r = person();
        let err = Filter::range("age", 100, "abc").matches(&r).unwrap_err();
        assert!(matches!(err, QueryError::TypeMismatch { .. }));
    }

    #[test]
    fn test_and_short_circuits_before_error() {
        let r = person();
        let f = Filter::and(vec![Filter::eq("age", 1), Filter::eq("missing", 1)]);
        assert!(!f.matches(&r).unwrap());
        let f = Filter::or(vec![Filter::eq("age", 30), Filter::eq("missing", 1)]);
        assert!(f.matches(&r).unwrap());
        let f = Filter::or(vec![Filter::eq("missing", 1), Filter::eq("age", 30)]);
        assert!(f.matches(&r).is_err());
    }

    #[test]
    fn test_empty_and_or() {
        let r = person();
        assert!(Filter::and(vec![]).matches(&r).unwrap());
        assert!(!Filter::or(vec![]).matches(&r).unwrap());
    }

    #[test]
    fn test_evaluates_raw_json() {
        let doc = json!({"Profile": {"Age": 42}});
        assert!(Filter::gte("profile.age", 40).matches(&doc).unwrap());
    }

    #[test]
    fn test_with_vars_leaves_original_untouched() {
        let original = Filter::and(vec![
            Filter::eq("city", "%city"),
            Filter::not(Filter::eq("name", "Mr %name")),
            Filter::gte("age", "%min"),
        ]);
        let mut vars = HashMap::new();
        vars.insert("city".to_string(), Value::from("Jakarta"));
        vars.insert("name".to_string(), Value::from("Budi"));
        vars.insert("min".to_string(), Value::Int(18));

        let resolved = original.with_vars(&vars);
        assert_eq!(
            resolved,
            Filter::and(vec![
                Filter::eq("city", "Jakarta"),
                Filter::not(Filter::eq("name", "Mr Budi")),
                Filter::gte("age", 18),
            ])
        );
        assert_eq!(
            original,
            Filter::and(vec![
                Filter::eq("city", "%city"),
                Filter::not(Filter::eq("name", "Mr %name")),
                Filter::gte("age", "%min"),
            ])
        );
    }

    #[test]
    fn test_with_vars_longest_name_first() {
        let mut vars = HashMap::new();
        vars.insert("a".to_string(), Value::from("1"));
        vars.insert("ab".to_string(), Value::from("2"));
        let f = Filter::eq("x", "%ab-%a").with_vars(&vars);
        assert_eq!(f, Filter::eq("x", "2-1"));
    }

    #[test]
    fn test_compare_op_parse() {
        assert_eq!("GTE".parse::<CompareOp>().unwrap(), CompareOp::Gte);
        assert_eq!("nin".parse::<CompareOp>().unwrap(), CompareOp::NotIn);
        assert!(matches!(
            "like".parse::<CompareOp>(),
            Err(QueryError::UnknownOperation(_))
        ));
    }

    #[test]
    fn test_filter_serde_shape() {
        let f = Filter::and(vec![Filter::eq("a", 1), Filter::not(Filter::gt("b", 2))]);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["and"][0]["compare"]["op"], "eq");
        let back: Filter = serde_json::from_value(json).unwrap();
        assert_eq!(back, f);
    }
}
