//! File-store connection
//!
//! A connection owns a directory of table files, one per table, named
//! `<table>.<ext>`. Reads open a [`Cursor`] and take no lock. Writes run
//! under the connection mutex and then the table's cross-process lock;
//! both guards drop in reverse order whatever the outcome. The configured
//! lock timeout bounds the wait for both locks together.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::config::{StoreConfig, StoreFormat};
use super::cursor::Cursor;
use super::errors::{StoreError, StoreResult};
use super::lock::TableLock;
use crate::codec::{JsonCodec, RecordCodec, TextCodec};
use crate::observability::{Event, Logger};
use crate::pool::PoolBackend;
use crate::query::QueryPlan;

/// Handle on one store directory
#[derive(Debug)]
pub struct Connection {
    config: StoreConfig,
    codec: Arc<dyn RecordCodec>,
    extension: String,
    write_lock: Mutex<()>,
    connected: AtomicBool,
    logger: Logger,
}

impl Connection {
    /// Builds an unconnected handle; call [`connect`](Self::connect) next
    pub fn new(config: StoreConfig, logger: Logger) -> StoreResult<Self> {
        config.validate()?;
        let codec: Arc<dyn RecordCodec> = match &config.format {
            StoreFormat::Json => Arc::new(JsonCodec::new()),
            StoreFormat::Text(text) => {
                Arc::new(TextCodec::new(text.clone()).with_logger(logger.clone()))
            }
        };
        let extension = config
            .extension
            .clone()
            .unwrap_or_else(|| codec.default_extension().to_string());
        Ok(Self {
            config,
            codec,
            extension,
            write_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
            logger,
        })
    }

    /// Builds and connects in one step
    pub fn open(config: StoreConfig, logger: Logger) -> StoreResult<Self> {
        let conn = Self::new(config, logger)?;
        conn.connect()?;
        Ok(conn)
    }

    /// Checks that the store directory exists
    pub fn connect(&self) -> StoreResult<()> {
        let dir = &self.config.dir;
        let is_dir = fs::metadata(dir).map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            return Err(StoreError::NotADirectory(dir.display().to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        let dir = dir.display().to_string();
        self.logger.info(
            Event::StoreConnected.as_str(),
            &[("dir", dir.as_str()), ("extension", self.extension.as_str())],
        );
        Ok(())
    }

    /// Marks the connection closed. Cursors already opened keep working.
    pub fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let dir = self.config.dir.display().to_string();
            self.logger
                .info(Event::StoreClosed.as_str(), &[("dir", dir.as_str())]);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub(crate) fn codec(&self) -> &dyn RecordCodec {
        self.codec.as_ref()
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    pub(crate) fn ensure_connected(&self) -> StoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    /// File backing `table`
    pub fn table_path(&self, table: &str) -> StoreResult<PathBuf> {
        let bad = table.is_empty()
            || table == "."
            || table == ".."
            || table.contains(['/', '\\', '\0']);
        if bad {
            return Err(StoreError::NoTable(table.to_string()));
        }
        Ok(self
            .config
            .dir
            .join(format!("{}.{}", table, self.extension)))
    }

    /// Opens a cursor over `plan`. Nothing is read until the first fetch.
    pub fn cursor(&self, plan: &QueryPlan) -> StoreResult<Cursor> {
        self.ensure_connected()?;
        plan.validate()?;
        let path = self.table_path(&plan.table)?;
        Ok(Cursor::new(
            self.codec.clone(),
            path,
            plan.clone(),
            self.logger.clone(),
        ))
    }

    /// Names of the tables present in the directory, sorted
    pub fn table_names(&self) -> StoreResult<Vec<String>> {
        self.ensure_connected()?;
        let entries = fs::read_dir(&self.config.dir)
            .map_err(|e| StoreError::Io(format!("list {}: {}", self.config.dir.display(), e)))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Removes a table file. Returns false when it did not exist.
    pub fn drop_table(&self, table: &str) -> StoreResult<bool> {
        self.with_table_lock(table, |path| match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!("remove {}: {}", path.display(), e))),
        })
        .map(|removed| {
            if removed {
                self.logger
                    .info(Event::TableDropped.as_str(), &[("table", table)]);
            }
            removed
        })
    }

    /// Runs `f` holding the connection mutex and the table file lock
    pub(crate) fn with_table_lock<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Path) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.ensure_connected()?;
        let path = self.table_path(table)?;

        let timeout = self.config.lock_timeout();
        let start = Instant::now();
        let timed_out = |lock: &Path| StoreError::LockTimeout {
            path: lock.display().to_string(),
            waited_ms: start.elapsed().as_millis(),
        };

        let result = match self.write_lock.try_lock_for(timeout) {
            None => Err(timed_out(&path)),
            Some(guard) => {
                let remaining = timeout.saturating_sub(start.elapsed());
                TableLock::acquire(&path, remaining, self.config.lock_poll())
                    .map(|file_lock| (guard, file_lock))
                    .map_err(|err| match err {
                        StoreError::LockTimeout { path, .. } => timed_out(Path::new(&path)),
                        other => other,
                    })
            }
        };
        let (_guard, _file_lock) = result.map_err(|err| {
            if let StoreError::LockTimeout { path, waited_ms } = &err {
                let waited = waited_ms.to_string();
                self.logger.warn(
                    Event::LockTimeout.as_str(),
                    &[
                        ("table", table),
                        ("lock", path.as_str()),
                        ("waited_ms", waited.as_str()),
                    ],
                );
            }
            err
        })?;

        f(&path)
    }

    /// Like [`with_table_lock`](Self::with_table_lock), creating the table
    /// file first when it does not exist
    pub(crate) fn with_table_write<R>(
        &self,
        table: &str,
        f: impl FnOnce(&Path) -> StoreResult<R>,
    ) -> StoreResult<R> {
        self.with_table_lock(table, |path| {
            if !path.exists() {
                self.codec.create_empty(path)?;
                self.logger
                    .info(Event::TableCreated.as_str(), &[("table", table)]);
            }
            f(path)
        })
    }
}

impl PoolBackend for Connection {
    fn close(&self) {
        Connection::close(self);
    }
}
