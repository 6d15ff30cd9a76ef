//! Insert, update, delete and save
//!
//! Every mutation is a read-modify-write of the whole table file under
//! [`Connection::with_table_write`]. The replacement content goes through
//! the codec's atomic sink, so readers see the old file or the new one.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::connection::Connection;
use super::errors::StoreResult;
use crate::codec::read_all;
use crate::observability::Event;
use crate::query::Filter;
use crate::record::{Record, Value};

/// A write against one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Insert {
        table: String,
        records: Vec<Record>,
    },
    /// Overlay `patch` onto every record matching `filter` (all when absent)
    Update {
        table: String,
        #[serde(default)]
        filter: Option<Filter>,
        patch: Record,
    },
    /// Remove matching records; no filter empties the table
    Delete {
        table: String,
        #[serde(default)]
        filter: Option<Filter>,
    },
    /// Update by identity field, insert when nothing matched
    Save { table: String, record: Record },
}

impl Command {
    pub fn table(&self) -> &str {
        match self {
            Command::Insert { table, .. }
            | Command::Update { table, .. }
            | Command::Delete { table, .. }
            | Command::Save { table, .. } => table,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Insert { .. } => "insert",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
            Command::Save { .. } => "save",
        }
    }

    /// Returns a copy with `%name` filter variables substituted
    pub fn with_vars(&self, vars: &HashMap<String, Value>) -> Self {
        let mut cmd = self.clone();
        match &mut cmd {
            Command::Update { filter, .. } | Command::Delete { filter, .. } => {
                *filter = filter.as_ref().map(|f| f.with_vars(vars));
            }
            Command::Insert { .. } | Command::Save { .. } => {}
        }
        cmd
    }
}

/// Result of a committed command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandOutcome {
    /// Records inserted, updated or removed
    pub affected: usize,
}

fn matches(filter: Option<&Filter>, record: &Record) -> StoreResult<bool> {
    match filter {
        Some(f) => Ok(f.matches(record)?),
        None => Ok(true),
    }
}

impl Connection {
    /// Runs one command and reports how many records it touched
    pub fn execute(&self, command: &Command) -> StoreResult<CommandOutcome> {
        let affected = match command {
            Command::Insert { table, records } => self.insert(table, records)?,
            Command::Update {
                table,
                filter,
                patch,
            } => self.update(table, filter.as_ref(), patch)?,
            Command::Delete { table, filter } => self.delete(table, filter.as_ref())?,
            Command::Save { table, record } => self.save(table, record)?,
        };
        Ok(CommandOutcome { affected })
    }

    /// Appends `records`, creating the table when missing
    pub fn insert(&self, table: &str, records: &[Record]) -> StoreResult<usize> {
        let result = self.with_table_write(table, |path| self.insert_locked(path, records));
        self.report(table, "insert", result)
    }

    /// Overlays `patch` on every matching record. Returns the match count;
    /// with no match the file is not rewritten.
    pub fn update(&self, table: &str, filter: Option<&Filter>, patch: &Record) -> StoreResult<usize> {
        let result = self.with_table_write(table, |path| self.update_locked(path, filter, patch));
        self.report(table, "update", result)
    }

    /// Removes matching records and returns how many went. Without a
    /// filter the table is emptied but kept.
    pub fn delete(&self, table: &str, filter: Option<&Filter>) -> StoreResult<usize> {
        let result = self.with_table_write(table, |path| {
            let records = read_all(self.codec(), path)?;
            let mut kept = Vec::with_capacity(records.len());
            let mut removed = 0;
            for record in records {
                if matches(filter, &record)? {
                    removed += 1;
                } else {
                    kept.push(record);
                }
            }
            if removed > 0 {
                self.codec().open_write(path)?.commit(&kept)?;
            }
            Ok(removed)
        });
        self.report(table, "delete", result)
    }

    /// Updates the record carrying the same identity value, or inserts it.
    /// A record without the identity field is always inserted.
    pub fn save(&self, table: &str, record: &Record) -> StoreResult<usize> {
        let id_field = self.config().id_field.as_str();
        let identity = record
            .get_path(id_field)
            .filter(|v| !v.is_null())
            .cloned();
        let result = self.with_table_write(table, |path| match identity {
            Some(id) => {
                let filter = Filter::eq(id_field, id);
                match self.update_locked(path, Some(&filter), record)? {
                    0 => self.insert_locked(path, std::slice::from_ref(record)),
                    n => Ok(n),
                }
            }
            None => self.insert_locked(path, std::slice::from_ref(record)),
        });
        self.report(table, "save", result)
    }

    /// Serializes `value` and inserts it
    pub fn insert_serialized<T: Serialize + ?Sized>(&self, table: &str, value: &T) -> StoreResult<usize> {
        let record = Record::from_serialize(value)?;
        self.insert(table, std::slice::from_ref(&record))
    }

    /// Serializes `value` and saves it
    pub fn save_serialized<T: Serialize + ?Sized>(&self, table: &str, value: &T) -> StoreResult<usize> {
        let record = Record::from_serialize(value)?;
        self.save(table, &record)
    }

    fn insert_locked(&self, path: &Path, records: &[Record]) -> StoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.codec().append(path, records)?;
        Ok(records.len())
    }

    fn update_locked(&self, path: &Path, filter: Option<&Filter>, patch: &Record) -> StoreResult<usize> {
        let mut records = read_all(self.codec(), path)?;
        let mut updated = 0;
        for record in records.iter_mut() {
            if matches(filter, record)? {
                record.overlay(patch);
                updated += 1;
            }
        }
        if updated > 0 {
            self.codec().open_write(path)?.commit(&records)?;
        }
        Ok(updated)
    }

    fn report(&self, table: &str, op: &str, result: StoreResult<usize>) -> StoreResult<usize> {
        match &result {
            Ok(affected) => {
                let affected = affected.to_string();
                self.logger().info(
                    Event::MutationApplied.as_str(),
                    &[("table", table), ("op", op), ("affected", affected.as_str())],
                );
            }
            Err(err) => {
                let message = err.to_string();
                self.logger().warn(
                    Event::MutationFailed.as_str(),
                    &[
                        ("table", table),
                        ("op", op),
                        ("code", err.code()),
                        ("error", message.as_str()),
                    ],
                );
            }
        }
        result
    }
}
