//! Key file encoding
//!
//! v1 layout (48 bytes):
//! ```text
//! [3 bytes: magic FF 4B 46][1 byte: format = 0x01][4 bytes: key_version BE][32 bytes: key][8 bytes: checksum]
//! checksum = BLAKE3(everything before it)[..8]
//! ```
//!
//! Any other file of at least 32 bytes is a legacy bare key: the first 32
//! bytes are the key and anything after is ignored. Legacy keys load with
//! key version 0. A legacy key may itself begin with the magic bytes, so the
//! magic alone does not select v1; the length must match too.

use keyward_crypto::{SymmetricKey, KEY_SIZE};
use zeroize::Zeroizing;

use crate::error::{KeyStoreError, KeyStoreResult};

pub const KEYFILE_MAGIC: [u8; 3] = [0xFF, b'K', b'F'];
pub const KEYFILE_FORMAT_V1: u8 = 0x01;
pub const CHECKSUM_SIZE: usize = 8;

const BODY_LEN: usize = KEYFILE_MAGIC.len() + 1 + 4 + KEY_SIZE;

/// Total size of a v1 key file
pub const KEYFILE_V1_LEN: usize = BODY_LEN + CHECKSUM_SIZE;

/// Key version reported for legacy bare key files
pub const LEGACY_KEY_VERSION: u32 = 0;

/// How a loaded key was stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFileFormat {
    V1,
    /// Bare key bytes; `trailing` bytes after the first 32 were ignored
    Legacy { trailing: usize },
}

/// Result of decoding key file contents.
#[derive(Debug)]
pub enum KeyFileContents {
    /// Fewer than 32 bytes: treated as absent (torn or truncated write)
    Missing { len: usize },
    Loaded {
        key: SymmetricKey,
        format: KeyFileFormat,
    },
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let hash = blake3::hash(body);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&hash.as_bytes()[..CHECKSUM_SIZE]);
    out
}

/// Encode `key` in the v1 layout.
pub fn encode(key: &SymmetricKey) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(KEYFILE_V1_LEN));
    out.extend_from_slice(&KEYFILE_MAGIC);
    out.push(KEYFILE_FORMAT_V1);
    out.extend_from_slice(&key.version().to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    let sum = checksum(&out);
    out.extend_from_slice(&sum);
    out
}

/// Decode key file contents.
///
/// A 48-byte file that carries the v1 magic but fails validation is an
/// error, never `Missing`: it may hold the only copy of a key and must not
/// be regenerated over.
pub fn decode(bytes: &[u8]) -> KeyStoreResult<KeyFileContents> {
    if bytes.len() < KEY_SIZE {
        return Ok(KeyFileContents::Missing { len: bytes.len() });
    }

    if bytes.len() != KEYFILE_V1_LEN || !bytes.starts_with(&KEYFILE_MAGIC) {
        let key = SymmetricKey::try_from_slice(&bytes[..KEY_SIZE], LEGACY_KEY_VERSION)?;
        return Ok(KeyFileContents::Loaded {
            key,
            format: KeyFileFormat::Legacy {
                trailing: bytes.len() - KEY_SIZE,
            },
        });
    }

    let format = bytes[KEYFILE_MAGIC.len()];
    if format != KEYFILE_FORMAT_V1 {
        return Err(KeyStoreError::KeyFormat(format!(
            "unsupported key file format {format:#04x}"
        )));
    }

    let (body, stored_sum) = bytes.split_at(BODY_LEN);
    if checksum(body) != stored_sum {
        return Err(KeyStoreError::KeyFormat("key file checksum mismatch".into()));
    }

    let version_start = KEYFILE_MAGIC.len() + 1;
    let mut version = [0u8; 4];
    version.copy_from_slice(&body[version_start..version_start + 4]);
    let key = SymmetricKey::try_from_slice(
        &body[version_start + 4..],
        u32::from_be_bytes(version),
    )?;

    Ok(KeyFileContents::Loaded {
        key,
        format: KeyFileFormat::V1,
    })
}
