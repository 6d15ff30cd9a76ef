//! Records: ordered maps of field name to [`Value`]
//!
//! Field lookup is case-insensitive. An exact match wins; otherwise the
//! first key (in key order) that matches ignoring ASCII case is used.
//! Dotted paths (`address.city`) descend into nested records.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::errors::RecordError;
use super::value::Value;

/// A named set of fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a top-level field. An existing key matching case-insensitively
    /// keeps its stored casing.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let name = name.into();
        let key = self.resolve_key(&name).map(str::to_string).unwrap_or(name);
        self.fields.insert(key, value.into())
    }

    /// Returns the stored key for `name`
    pub fn resolve_key(&self, name: &str) -> Option<&str> {
        if let Some((k, _)) = self.fields.get_key_value(name) {
            return Some(k.as_str());
        }
        self.fields
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    /// Top-level lookup, no path splitting
    pub fn get(&self, name: &str) -> Option<&Value> {
        let key = self.resolve_key(name)?;
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let key = self.resolve_key(name)?.to_string();
        self.fields.get_mut(&key)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let key = self.resolve_key(name)?.to_string();
        self.fields.remove(&key)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolve_key(name).is_some()
    }

    /// Looks up a dotted path
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.get(path) {
            return Some(v);
        }
        let (head, rest) = path.split_once('.')?;
        self.get(head)?.as_record()?.get_path(rest)
    }

    /// Resolves a dotted path to the stored casing of every segment
    pub fn resolve_path(&self, path: &str) -> Option<String> {
        if let Some(k) = self.resolve_key(path) {
            return Some(k.to_string());
        }
        let (head, rest) = path.split_once('.')?;
        let key = self.resolve_key(head)?;
        let inner = self.fields.get(key)?.as_record()?.resolve_path(rest)?;
        Some(format!("{}.{}", key, inner))
    }

    /// Sets a dotted path, creating intermediate records. An intermediate
    /// value that is not a record is replaced.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        match path.split_once('.') {
            None => {
                self.set(path, value);
            }
            Some((head, rest)) => {
                let key = self
                    .resolve_key(head)
                    .map(str::to_string)
                    .unwrap_or_else(|| head.to_string());
                let slot = self
                    .fields
                    .entry(key)
                    .or_insert_with(|| Value::Record(Record::new()));
                if slot.as_record().is_none() {
                    *slot = Value::Record(Record::new());
                }
                if let Some(inner) = slot.as_record_mut() {
                    inner.set_path(rest, value);
                }
            }
        }
    }

    /// Overlays `patch` onto this record leaf by leaf, matching names
    /// case-insensitively. Fields absent from `patch` are left alone.
    pub fn overlay(&mut self, patch: &Record) {
        for (path, value) in patch.flatten() {
            self.set_path(&path, value);
        }
    }

    /// Keeps only the named fields, in the order given. Missing fields are
    /// skipped.
    pub fn project(&self, names: &[String]) -> Record {
        let mut out = Record::new();
        for name in names {
            if let Some(v) = self.get_path(name) {
                let key = self.resolve_path(name).unwrap_or_else(|| name.clone());
                out.set_path(&key, v.clone());
            }
        }
        out
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Flattens nested records into dotted leaf paths, sorted by path
    pub fn flatten(&self) -> Vec<(String, Value)> {
        let mut out = Vec::with_capacity(self.fields.len());
        self.flatten_into("", &mut out);
        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, Value)>) {
        for (k, v) in &self.fields {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{}.{}", prefix, k)
            };
            match v {
                Value::Record(inner) if !inner.is_empty() => inner.flatten_into(&path, out),
                other => out.push((path, other.clone())),
            }
        }
    }

    pub fn from_json_object(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let fields = map
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect();
        Self { fields }
    }

    /// Parses a JSON value, which must be an object
    pub fn from_json(json: serde_json::Value) -> Result<Self, RecordError> {
        match json {
            serde_json::Value::Object(map) => Ok(Self::from_json_object(map)),
            other => Err(RecordError::NotAnObject(json_kind(&other).to_string())),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Converts any serializable struct or map into a record
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, RecordError> {
        let json = serde_json::to_value(value).map_err(|e| RecordError::Serde(e.to_string()))?;
        Self::from_json(json)
    }

    /// Populates a caller-supplied type from this record
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, RecordError> {
        serde_json::from_value(self.to_json()).map_err(|e| RecordError::Serde(e.to_string()))
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut rec = Record::new();
        for (k, v) in iter {
            rec.set(k, v);
        }
        rec
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let fields = BTreeMap::<String, Value>::deserialize(deserializer)?;
        Ok(Self { fields })
    }
}
