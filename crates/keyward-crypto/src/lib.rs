//! keyward-crypto: envelope encryption for keyward
//!
//! Bulk data is sealed with AES-256-GCM under a 256-bit symmetric key.
//! RSA (PKCS#1 v1.5) protects small payloads and wraps symmetric keys.
//!
//! Wire formats:
//! ```text
//! Envelope v1:  [0x01][key_version: u32 BE][12-byte nonce][ciphertext][16-byte tag]
//!               AAD = first 5 bytes (format + key_version)
//! Legacy:       [12-byte nonce][ciphertext][16-byte tag]
//! Sealed v1:    [0x01][wrapped_len: u16 BE][RSA-wrapped data key][Envelope v1]
//! ```

pub mod asymmetric;
pub mod codec;
pub mod error;
pub mod hybrid;
pub mod symmetric;

pub use asymmetric::{
    confirm_key_pair_match, decrypt_with_private_key, encrypt_with_public_key,
    generate_key_pair, generate_key_pair_with_bits, public_key_from_private, PrivateKey,
    PublicKey,
};
pub use error::{CryptoError, CryptoResult};
pub use hybrid::{open, seal, unwrap_symmetric_key, wrap_symmetric_key};
pub use symmetric::{decrypt, decrypt_legacy, encrypt, envelope_key_version, SymmetricKey};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM nonce (96-bit)
pub const NONCE_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Format byte of the current envelope layout
pub const ENVELOPE_FORMAT_V1: u8 = 0x01;

/// Format byte + key version
pub const ENVELOPE_HEADER_SIZE: usize = 1 + 4;

/// Default RSA modulus size in bits
pub const RSA_MODULUS_BITS: usize = 2048;

/// PKCS#1 v1.5 encryption padding overhead in bytes
pub const PKCS1_V15_OVERHEAD: usize = 11;
