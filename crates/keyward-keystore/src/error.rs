use std::path::PathBuf;

use keyward_crypto::CryptoError;
use thiserror::Error;

pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("key file I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid key file: {0}")]
    KeyFormat(String),

    #[error(
        "timed out waiting for key file lock {path}; if no other process is repairing \
         the key file, the lock is stale and can be removed"
    )]
    LockTimeout { path: PathBuf },

    #[error("key file {path} kept changing while it was being loaded")]
    Contended { path: PathBuf },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl KeyStoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
