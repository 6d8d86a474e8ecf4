//! Filesystem operations for the sharded store.
//!
//! Concurrent writers racing to materialize the same path are arbitrated by
//! a non-blocking exclusive advisory lock: the loser gets [`StoreError::Busy`]
//! and must drop its copy, never retry. All racers hold identical bytes for
//! a given path, so losing is harmless.

use camino::Utf8Path;
use fs4::fs_std::FileExt;
use fs_err as fs;
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer holds the advisory lock on this path.
    #[error("path is locked by another writer")]
    Busy,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Create `path` and all missing ancestors. Idempotent.
pub fn ensure_dir(path: &Utf8Path) -> Result<(), StoreError> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn exists(path: &Utf8Path) -> bool {
    path.exists()
}

/// Write `bytes` to `path` under an exclusive advisory lock.
///
/// The file is created (truncated if present) before the lock attempt; a
/// short write surfaces as `Io` and the file must be treated as absent by
/// the next reader.
pub fn write_new(path: &Utf8Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    if !file.file().try_lock_exclusive()? {
        return Err(StoreError::Busy);
    }
    let written = file.write_all(bytes).and_then(|_| file.flush());
    let _ = file.file().unlock();
    written?;
    Ok(())
}

pub fn read_all(path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
    Ok(fs::read(path)?)
}
