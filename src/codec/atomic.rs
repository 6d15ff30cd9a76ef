//! Atomic file replacement
//!
//! Content goes to a temp file in the target's directory, is fsynced,
//! then renamed over the target. Readers see either the old file or the
//! new one, never a partial write.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::errors::{CodecError, CodecResult};

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Replaces `path` with whatever `write` produces.
///
/// On error the temp file is removed and `path` is untouched.
pub(crate) fn replace_with<F>(path: &Path, write: F) -> CodecResult<()>
where
    F: FnOnce(&mut dyn Write) -> CodecResult<()>,
{
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| CodecError::io(format!("create temp file in {}", dir.display()), &e))?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write(&mut writer)?;
        writer
            .flush()
            .map_err(|e| CodecError::io(format!("write temp file for {}", path.display()), &e))?;
    }

    tmp.as_file()
        .sync_all()
        .map_err(|e| CodecError::io(format!("fsync temp file for {}", path.display()), &e))?;

    tmp.persist(path)
        .map_err(|e| CodecError::io(format!("rename over {}", path.display()), &e.error))?;

    sync_dir(dir).map_err(|e| CodecError::io(format!("fsync {}", dir.display()), &e))
}

/// Creates `path` with `content` unless it already exists.
pub(crate) fn create_if_missing(path: &Path, content: &[u8]) -> CodecResult<()> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            file.write_all(content)
                .and_then(|_| file.sync_all())
                .map_err(|e| CodecError::io(format!("initialise {}", path.display()), &e))?;
            sync_dir(parent_dir(path))
                .map_err(|e| CodecError::io(format!("fsync dir of {}", path.display()), &e))
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(CodecError::io(format!("create {}", path.display()), &e)),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
