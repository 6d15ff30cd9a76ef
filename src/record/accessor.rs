//! Field access capability
//!
//! The filter, aggregation and sort engines are generic over
//! [`FieldAccessor`], so they work on [`Record`]s and on raw
//! `serde_json::Value` objects alike.

use std::borrow::Cow;

use super::record::Record;
use super::value::Value;

/// Uniform read/write access to named fields.
///
/// Names may be dotted paths. Lookup is case-insensitive with exact
/// matches preferred.
pub trait FieldAccessor {
    /// Reads a field, `None` if absent
    fn field(&self, path: &str) -> Option<Cow<'_, Value>>;

    /// Writes a field, creating intermediate containers as needed
    fn set_field(&mut self, path: &str, value: Value);

    /// Top-level field names as stored
    fn field_names(&self) -> Vec<String>;

    /// Stored casing of a path, `None` if absent
    fn resolve_path(&self, path: &str) -> Option<String>;
}

impl FieldAccessor for Record {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        self.get_path(path).map(Cow::Borrowed)
    }

    fn set_field(&mut self, path: &str, value: Value) {
        self.set_path(path, value);
    }

    fn field_names(&self) -> Vec<String> {
        self.keys().map(str::to_string).collect()
    }

    fn resolve_path(&self, path: &str) -> Option<String> {
        Record::resolve_path(self, path)
    }
}

fn json_key<'a>(map: &'a serde_json::Map<String, serde_json::Value>, name: &str) -> Option<&'a str> {
    if let Some((k, _)) = map.get_key_value(name) {
        return Some(k.as_str());
    }
    map.keys()
        .find(|k| k.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

fn json_lookup<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let map = json.as_object()?;
    if let Some(k) = json_key(map, path) {
        return map.get(k);
    }
    let (head, rest) = path.split_once('.')?;
    let k = json_key(map, head)?;
    json_lookup(map.get(k)?, rest)
}

impl FieldAccessor for serde_json::Value {
    fn field(&self, path: &str) -> Option<Cow<'_, Value>> {
        json_lookup(self, path).map(|v| Cow::Owned(Value::from_json(v.clone())))
    }

    fn set_field(&mut self, path: &str, value: Value) {
        if !self.is_object() {
            *self = serde_json::Value::Object(serde_json::Map::new());
        }
        let serde_json::Value::Object(map) = self else {
            return;
        };
        let (head, rest) = match path.split_once('.') {
            Some((h, r)) => (h, Some(r)),
            None => (path, None),
        };
        let key = json_key(map, head)
            .map(str::to_string)
            .unwrap_or_else(|| head.to_string());
        match rest {
            None => {
                map.insert(key, value.to_json());
            }
            Some(rest) => {
                let slot = map
                    .entry(key)
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
                slot.set_field(rest, value);
            }
        }
    }

    fn field_names(&self) -> Vec<String> {
        self.as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn resolve_path(&self, path: &str) -> Option<String> {
        let map = self.as_object()?;
        if let Some(k) = json_key(map, path) {
            return Some(k.to_string());
        }
        let (head, rest) = path.split_once('.')?;
        let k = json_key(map, head)?;
        let inner = map.get(k)?.resolve_path(rest)?;
        Some(format!("{}.{}", k, inner))
    }
}
