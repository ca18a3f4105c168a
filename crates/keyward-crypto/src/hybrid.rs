//! Hybrid envelope encryption: AES-256-GCM data key wrapped under RSA
//!
//! Sealed format (binary):
//! ```text
//! [1 byte: format = 0x01][2 bytes: wrapped_len BE][wrapped_len bytes: RSA PKCS#1 v1.5 data key][envelope v1]
//! ```
//!
//! A fresh data key is generated for every `seal` call. `open` reports every
//! cryptographic failure, whether in unwrapping or in the AEAD, as the same
//! `Decryption` error.

use zeroize::Zeroizing;

use crate::asymmetric::{PrivateKey, PublicKey};
use crate::error::{CryptoError, CryptoResult};
use crate::symmetric::{self, SymmetricKey, MIN_ENVELOPE_LEN};
use crate::KEY_SIZE;

/// Format byte of the current sealed layout
pub const SEALED_FORMAT_V1: u8 = 0x01;

const SEALED_HEADER_SIZE: usize = 1 + 2;

/// Key version carried by ephemeral data keys; they are never rotated
const DATA_KEY_VERSION: u32 = 0;

/// Wrap a symmetric key for transport to the holder of `public`'s private key.
pub fn wrap_symmetric_key(public: &PublicKey, key: &SymmetricKey) -> CryptoResult<Vec<u8>> {
    public.encrypt(key.as_bytes())
}

/// Unwrap a key produced by [`wrap_symmetric_key`], tagging it with `version`.
pub fn unwrap_symmetric_key(
    private: &PrivateKey,
    wrapped: &[u8],
    version: u32,
) -> CryptoResult<SymmetricKey> {
    let plaintext = Zeroizing::new(private.decrypt(wrapped)?);
    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::Decryption);
    }
    SymmetricKey::try_from_slice(&plaintext, version).map_err(|_| CryptoError::Decryption)
}

/// Encrypt `plaintext` so that only the holder of `public`'s private key can read it.
pub fn seal(public: &PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let data_key = SymmetricKey::generate(DATA_KEY_VERSION)?;
    let wrapped = wrap_symmetric_key(public, &data_key)?;
    let envelope = symmetric::encrypt(&data_key, plaintext)?;

    let wrapped_len = u16::try_from(wrapped.len()).map_err(|_| {
        CryptoError::Encryption(format!("wrapped key of {} bytes", wrapped.len()))
    })?;

    let mut result = Vec::with_capacity(SEALED_HEADER_SIZE + wrapped.len() + envelope.len());
    result.push(SEALED_FORMAT_V1);
    result.extend_from_slice(&wrapped_len.to_be_bytes());
    result.extend_from_slice(&wrapped);
    result.extend_from_slice(&envelope);
    Ok(result)
}

/// Decrypt a message produced by [`seal`].
pub fn open(private: &PrivateKey, sealed: &[u8]) -> CryptoResult<Vec<u8>> {
    if sealed.len() < SEALED_HEADER_SIZE {
        return Err(CryptoError::MalformedInput {
            len: sealed.len(),
            min: SEALED_HEADER_SIZE + MIN_ENVELOPE_LEN,
        });
    }
    if sealed[0] != SEALED_FORMAT_V1 {
        return Err(CryptoError::UnsupportedFormat(sealed[0]));
    }

    let wrapped_len = u16::from_be_bytes([sealed[1], sealed[2]]) as usize;
    let min = SEALED_HEADER_SIZE + wrapped_len + MIN_ENVELOPE_LEN;
    if sealed.len() < min {
        return Err(CryptoError::MalformedInput {
            len: sealed.len(),
            min,
        });
    }

    let (wrapped, envelope) = sealed[SEALED_HEADER_SIZE..].split_at(wrapped_len);
    let data_key = unwrap_symmetric_key(private, wrapped, DATA_KEY_VERSION)?;

    symmetric::decrypt(&data_key, envelope).map_err(|_| CryptoError::Decryption)
}
