//! Crash-safe key file writes and the repair lock
//!
//! Every write goes to a temp file in the destination directory, is fsynced,
//! and only then becomes visible under the real name, so readers see either
//! the old contents or the complete new contents.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::NamedTempFile;

use crate::error::{KeyStoreError, KeyStoreResult};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn staged(path: &Path, contents: &[u8]) -> std::io::Result<NamedTempFile> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

#[cfg(unix)]
fn sync_dir(path: &Path) -> std::io::Result<()> {
    File::open(parent_dir(path))?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Create `path` with `contents` unless it already exists.
///
/// Returns `Ok(false)` when another writer got there first; the existing
/// file is left untouched.
pub(crate) fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<bool> {
    let tmp = staged(path, contents)?;

    match tmp.persist_noclobber(path) {
        Ok(_) => {
            sync_dir(path)?;
            Ok(true)
        }
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e.error),
    }
}

/// Atomically replace `path` with `contents`.
///
/// Only called while holding a [`RepairLock`].
pub(crate) fn replace(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = staged(path, contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    sync_dir(path)
}

/// Exclusive `<key file>.lock`, removed on drop.
#[derive(Debug)]
pub(crate) struct RepairLock {
    path: PathBuf,
    _file: File,
}

impl Drop for RepairLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(
                "failed to remove key file lock {}: {e}",
                self.path.display()
            );
        }
    }
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// Acquire the repair lock for `path`, polling until `timeout` elapses.
///
/// Uses `create_new` semantics: the lock file existing means another writer
/// is repairing the key file.
pub(crate) fn acquire_lock(path: &Path, timeout: Duration) -> KeyStoreResult<RepairLock> {
    let lock_path = lock_path(path);
    let started = Instant::now();

    loop {
        match OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&lock_path)
        {
            Ok(file) => {
                tracing::debug!("acquired key file lock {}", lock_path.display());
                return Ok(RepairLock {
                    path: lock_path,
                    _file: file,
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                if started.elapsed() >= timeout {
                    return Err(KeyStoreError::LockTimeout { path: lock_path });
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(e) => return Err(KeyStoreError::io(&lock_path, e)),
        }
    }
}
