//! KeyStore: resolve the process's symmetric key from its key file

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use keyward_core::config::KeyStoreConfig;
use keyward_crypto::{SymmetricKey, KEY_SIZE};
use zeroize::Zeroizing;

use crate::atomic;
use crate::error::{KeyStoreError, KeyStoreResult};
use crate::keyfile::{self, KeyFileContents, KeyFileFormat};
use crate::FIRST_KEY_VERSION;

/// Default wait for the repair lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on read/create rounds when other writers keep racing us
const MAX_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub enum KeyState {
    Uninitialized,
    Ready(Arc<SymmetricKey>),
}

/// What a rotation request did.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RotationOutcome {
    /// Rotation is not implemented yet; the key file was left as is.
    Deferred { current_version: Option<u32> },
}

/// How a key was obtained by [`resolve_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// This call created the key file
    Generated,
    /// This call replaced a key file too short to hold a key
    Repaired,
    /// The key file already held a key
    Loaded,
}

/// Owns the key file path and, once resolved, the shared key handle.
///
/// Repairing a truncated key file takes an exclusive `<key file>.lock`. A
/// process that crashes mid-repair leaves that file behind, and later repairs
/// fail with [`KeyStoreError::LockTimeout`] until it is deleted. The lock is
/// never taken when the key file already holds a key, so a stale lock only
/// blocks recovery of a truncated file. To recover, stop every process using
/// the key file, delete `<key file>.lock`, and call `ensure_key` again.
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    lock_timeout: Duration,
    state: KeyState,
}

impl KeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            state: KeyState::Uninitialized,
        }
    }

    pub fn from_config(config: &KeyStoreConfig) -> Self {
        Self::new(config.key_file.clone()).with_lock_timeout(config.lock_timeout())
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &KeyState {
        &self.state
    }

    /// The resolved key, if [`KeyStore::ensure_key`] has succeeded.
    pub fn key(&self) -> Option<Arc<SymmetricKey>> {
        match &self.state {
            KeyState::Ready(key) => Some(Arc::clone(key)),
            KeyState::Uninitialized => None,
        }
    }

    /// Load or create the key. The file is only touched on the first call.
    pub fn ensure_key(&mut self) -> KeyStoreResult<Arc<SymmetricKey>> {
        if let KeyState::Ready(key) = &self.state {
            return Ok(Arc::clone(key));
        }

        let key = Arc::new(ensure_key_with_timeout(&self.path, self.lock_timeout)?);
        self.state = KeyState::Ready(Arc::clone(&key));
        Ok(key)
    }

    pub fn rotate_key(&mut self) -> KeyStoreResult<RotationOutcome> {
        rotate_key(&self.path)
    }
}

/// Load the key at `path`, generating and persisting one if there is none.
pub fn ensure_key(path: &Path) -> KeyStoreResult<SymmetricKey> {
    ensure_key_with_timeout(path, DEFAULT_LOCK_TIMEOUT)
}

pub fn ensure_key_with_timeout(
    path: &Path,
    lock_timeout: Duration,
) -> KeyStoreResult<SymmetricKey> {
    resolve_key(path, lock_timeout).map(|(key, _)| key)
}

/// Like [`ensure_key_with_timeout`], also reporting whether this call wrote
/// the key file. Among concurrent callers on one path, exactly one sees
/// [`KeyOrigin::Generated`] (or [`KeyOrigin::Repaired`]).
pub fn resolve_key(
    path: &Path,
    lock_timeout: Duration,
) -> KeyStoreResult<(SymmetricKey, KeyOrigin)> {
    for attempt in 0..MAX_ATTEMPTS {
        match read_key_file(path)? {
            None => {
                let key = SymmetricKey::generate(FIRST_KEY_VERSION)?;
                let encoded = keyfile::encode(&key);
                let created =
                    atomic::write_new(path, &encoded).map_err(|e| KeyStoreError::io(path, e))?;
                if created {
                    tracing::info!(
                        path = %path.display(),
                        version = key.version(),
                        "generated new symmetric key"
                    );
                    return Ok((key, KeyOrigin::Generated));
                }
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    "key file created concurrently, loading it"
                );
            }
            Some(bytes) => match keyfile::decode(&bytes)? {
                KeyFileContents::Loaded { key, format } => {
                    log_loaded(path, &key, format);
                    return Ok((key, KeyOrigin::Loaded));
                }
                KeyFileContents::Missing { len } => {
                    tracing::warn!(
                        path = %path.display(),
                        len,
                        "key file too short to hold a key, regenerating"
                    );
                    if let Some(key) = repair_short_file(path, lock_timeout)? {
                        return Ok((key, KeyOrigin::Repaired));
                    }
                }
            },
        }
    }

    Err(KeyStoreError::Contended {
        path: path.to_path_buf(),
    })
}

/// Request rotation of the key at `path`.
///
/// Not implemented: the key file is left untouched and the current key
/// version (if any) is reported back. Envelopes and key files already carry
/// a key version so a real rotation can be added without a format change.
pub fn rotate_key(path: &Path) -> KeyStoreResult<RotationOutcome> {
    let current_version = match read_key_file(path)? {
        Some(bytes) => match keyfile::decode(&bytes)? {
            KeyFileContents::Loaded { key, .. } => Some(key.version()),
            KeyFileContents::Missing { .. } => None,
        },
        None => None,
    };

    tracing::warn!(
        path = %path.display(),
        ?current_version,
        "key rotation requested but not implemented; key unchanged"
    );
    Ok(RotationOutcome::Deferred { current_version })
}

fn read_key_file(path: &Path) -> KeyStoreResult<Option<Zeroizing<Vec<u8>>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KeyStoreError::io(path, e)),
    }
}

/// Replace a too-short key file under the repair lock.
///
/// Returns `None` if another writer fixed or removed the file while we
/// waited for the lock; the caller starts over.
fn repair_short_file(
    path: &Path,
    lock_timeout: Duration,
) -> KeyStoreResult<Option<SymmetricKey>> {
    let _lock = atomic::acquire_lock(path, lock_timeout)?;

    match read_key_file(path)? {
        Some(bytes) if bytes.len() < KEY_SIZE => {
            let key = SymmetricKey::generate(FIRST_KEY_VERSION)?;
            atomic::replace(path, &keyfile::encode(&key)).map_err(|e| KeyStoreError::io(path, e))?;
            tracing::info!(
                path = %path.display(),
                version = key.version(),
                "replaced truncated key file with a new key"
            );
            Ok(Some(key))
        }
        _ => Ok(None),
    }
}

fn log_loaded(path: &Path, key: &SymmetricKey, format: KeyFileFormat) {
    match format {
        KeyFileFormat::V1 => {
            tracing::debug!(
                path = %path.display(),
                version = key.version(),
                "loaded symmetric key"
            );
        }
        KeyFileFormat::Legacy { trailing: 0 } => {
            tracing::debug!(path = %path.display(), "loaded legacy symmetric key");
        }
        KeyFileFormat::Legacy { trailing } => {
            tracing::warn!(
                path = %path.display(),
                trailing,
                "legacy key file is longer than a key; using the first {KEY_SIZE} bytes"
            );
        }
    }
}
