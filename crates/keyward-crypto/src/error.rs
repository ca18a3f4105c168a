//! Error types for keyward cryptographic operations
//!
//! `Authentication` and `Decryption` carry no detail on purpose: callers
//! must not be able to tell a wrong key from tampered or corrupted input.

use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key format: {0}")]
    KeyFormat(String),

    #[error("key parse error: {0}")]
    KeyParse(String),

    #[error("cipher initialization failed: {0}")]
    CipherInit(String),

    #[error("authentication failed")]
    Authentication,

    #[error("malformed input: {len} bytes (minimum {min})")]
    MalformedInput { len: usize, min: usize },

    #[error("unsupported format version: {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("key generation failed: {0}")]
    KeyGen(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed")]
    Decryption,

    #[error("payload too large: {len} bytes (maximum {max})")]
    PayloadTooLarge { len: usize, max: usize },
}
