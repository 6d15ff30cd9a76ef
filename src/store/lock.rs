//! Cross-process table lock
//!
//! Each table file `<name>.<ext>` has a sidecar `<name>.<ext>.lock`. A
//! writer holds an exclusive advisory lock on the sidecar for the whole
//! read-modify-write. The sidecar itself is never removed.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

use super::errors::{StoreError, StoreResult};

/// Sidecar lock path for a table file
pub(crate) fn lock_path(table_path: &Path) -> PathBuf {
    let mut os: OsString = table_path.as_os_str().to_owned();
    os.push(".lock");
    PathBuf::from(os)
}

/// Exclusive lock on a table's sidecar file; released on drop
#[derive(Debug)]
pub(crate) struct TableLock {
    file: File,
}

/// True when `err` only means another holder has the lock
fn is_contended(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::WouldBlock {
        return true;
    }
    let contended = fs2::lock_contended_error();
    err.raw_os_error().is_some() && err.raw_os_error() == contended.raw_os_error()
}

impl TableLock {
    /// Polls `try_lock_exclusive` every `poll` until `timeout` has passed.
    /// A zero timeout makes a single attempt.
    pub(crate) fn acquire(table_path: &Path, timeout: Duration, poll: Duration) -> StoreResult<Self> {
        let path = lock_path(table_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StoreError::Io(format!("open {}: {}", path.display(), e)))?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file }),
                Err(e) if !is_contended(&e) => {
                    return Err(StoreError::Io(format!("lock {}: {}", path.display(), e)))
                }
                Err(_) => {
                    let waited = start.elapsed();
                    if waited >= timeout {
                        return Err(StoreError::LockTimeout {
                            path: path.display().to_string(),
                            waited_ms: waited.as_millis(),
                        });
                    }
                    thread::sleep(poll.min(timeout - waited));
                }
            }
        }
    }
}

impl Drop for TableLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
