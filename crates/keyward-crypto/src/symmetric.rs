//! AES-256-GCM envelope encryption/decryption
//!
//! Envelope format (binary):
//! ```text
//! [1 byte: format = 0x01][4 bytes: key_version BE][12 bytes: random nonce][N bytes: ciphertext][16 bytes: GCM tag]
//! AAD = format || key_version
//! ```
//!
//! The nonce is drawn from the OS CSPRNG on every call. There is no way to
//! pass a nonce in, so a nonce is never reused under the same key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::{ENVELOPE_FORMAT_V1, ENVELOPE_HEADER_SIZE, KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// Smallest valid v1 envelope: header + nonce + tag (empty plaintext)
pub const MIN_ENVELOPE_LEN: usize = ENVELOPE_HEADER_SIZE + NONCE_SIZE + TAG_SIZE;

/// Smallest valid version-less envelope: nonce + tag
pub const MIN_LEGACY_ENVELOPE_LEN: usize = NONCE_SIZE + TAG_SIZE;

/// A 256-bit symmetric key tagged with its key version. Zeroized on drop.
///
/// Version 0 marks a key loaded from a legacy key file that carried no
/// version; generated keys start at 1.
#[derive(Clone)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
    version: u32,
}

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE], version: u32) -> Self {
        Self { bytes, version }
    }

    /// Build a key from a slice that must be exactly `KEY_SIZE` bytes long.
    pub fn try_from_slice(bytes: &[u8], version: u32) -> CryptoResult<Self> {
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::KeyFormat(format!(
                "symmetric key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(array, version))
    }

    /// Generate a fresh key from the OS random source.
    pub fn generate(version: u32) -> CryptoResult<Self> {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| CryptoError::KeyGen(format!("OS random source: {e}")))?;
        Ok(Self::from_bytes(bytes, version))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("bytes", &"[REDACTED]")
            .field("version", &self.version)
            .finish()
    }
}

fn build_cipher(key: &SymmetricKey) -> CryptoResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| CryptoError::CipherInit(e.to_string()))
}

fn build_header(key_version: u32) -> [u8; ENVELOPE_HEADER_SIZE] {
    let mut header = [0u8; ENVELOPE_HEADER_SIZE];
    header[0] = ENVELOPE_FORMAT_V1;
    header[1..].copy_from_slice(&key_version.to_be_bytes());
    header
}

fn random_nonce() -> CryptoResult<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng
        .try_fill_bytes(&mut nonce)
        .map_err(|e| CryptoError::Encryption(format!("nonce generation: {e}")))?;
    Ok(nonce)
}

/// Encrypt `plaintext` under `key`.
///
/// Returns: `[0x01][key_version][12-byte nonce][ciphertext][16-byte tag]`
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = build_cipher(key)?;
    let header = build_header(key.version());
    let nonce_bytes = random_nonce()?;

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("AES-256-GCM: {e}")))?;

    let mut result = Vec::with_capacity(ENVELOPE_HEADER_SIZE + NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&header);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// The length is checked before the cipher is touched. Every tag failure
/// maps to [`CryptoError::Authentication`].
pub fn decrypt(key: &SymmetricKey, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::MalformedInput {
            len: envelope.len(),
            min: MIN_ENVELOPE_LEN,
        });
    }
    if envelope[0] != ENVELOPE_FORMAT_V1 {
        return Err(CryptoError::UnsupportedFormat(envelope[0]));
    }

    let (header, rest) = envelope.split_at(ENVELOPE_HEADER_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
    let cipher = build_cipher(key)?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| CryptoError::Authentication)
}

/// Decrypt a version-less `[nonce][ciphertext][tag]` envelope with no AAD.
///
/// Kept for data written before envelopes carried a header.
pub fn decrypt_legacy(key: &SymmetricKey, envelope: &[u8]) -> CryptoResult<Vec<u8>> {
    if envelope.len() < MIN_LEGACY_ENVELOPE_LEN {
        return Err(CryptoError::MalformedInput {
            len: envelope.len(),
            min: MIN_LEGACY_ENVELOPE_LEN,
        });
    }

    let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_SIZE);
    let cipher = build_cipher(key)?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::Authentication)
}

/// Read the key version an envelope was sealed under, without decrypting.
pub fn envelope_key_version(envelope: &[u8]) -> CryptoResult<u32> {
    if envelope.len() < MIN_ENVELOPE_LEN {
        return Err(CryptoError::MalformedInput {
            len: envelope.len(),
            min: MIN_ENVELOPE_LEN,
        });
    }
    if envelope[0] != ENVELOPE_FORMAT_V1 {
        return Err(CryptoError::UnsupportedFormat(envelope[0]));
    }

    let mut version = [0u8; 4];
    version.copy_from_slice(&envelope[1..ENVELOPE_HEADER_SIZE]);
    Ok(u32::from_be_bytes(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn test_key() -> SymmetricKey {
        SymmetricKey::from_bytes([0x01u8; KEY_SIZE], 1)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate(1).unwrap();
        let plaintext = b"hello, encrypted world!";

        let envelope = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &envelope).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_hello_twice_differs() {
        let key = test_key();

        let a = encrypt(&key, b"hello").unwrap();
        let b = encrypt(&key, b"hello").unwrap();

        assert_ne!(a, b, "fresh nonces must give distinct ciphertexts");
        assert_eq!(decrypt(&key, &a).unwrap(), b"hello");
        assert_eq!(decrypt(&key, &b).unwrap(), b"hello");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = test_key();

        let envelope = encrypt(&key, b"").unwrap();
        assert_eq!(envelope.len(), MIN_ENVELOPE_LEN);
        assert_eq!(decrypt(&key, &envelope).unwrap(), b"");
    }

    #[test]
    fn test_envelope_size() {
        let key = test_key();
        let envelope = encrypt(&key, &[0u8; 1000]).unwrap();

        // header (5) + nonce (12) + plaintext (1000) + tag (16) = 1033
        assert_eq!(envelope.len(), 5 + 12 + 1000 + 16);
        assert_eq!(envelope[0], ENVELOPE_FORMAT_V1);
    }

    #[test]
    fn test_decrypt_wrong_key() {
        let key1 = SymmetricKey::generate(1).unwrap();
        let key2 = SymmetricKey::generate(1).unwrap();

        let envelope = encrypt(&key1, b"secret data").unwrap();
        let result = decrypt(&key2, &envelope);

        assert!(matches!(result, Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_tampered_ciphertext() {
        let key = test_key();

        let mut envelope = encrypt(&key, b"secret data").unwrap();
        // Flip a byte in the ciphertext (after header + nonce)
        envelope[ENVELOPE_HEADER_SIZE + NONCE_SIZE] ^= 0xFF;

        assert!(matches!(
            decrypt(&key, &envelope),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_tampered_key_version() {
        let key = test_key();

        let mut envelope = encrypt(&key, b"secret data").unwrap();
        envelope[4] ^= 0x01;

        assert!(
            matches!(decrypt(&key, &envelope), Err(CryptoError::Authentication)),
            "header is bound as AAD"
        );
    }

    #[test]
    fn test_short_envelope_is_malformed() {
        let key = test_key();

        for len in [0, 1, 12, 28, MIN_ENVELOPE_LEN - 1] {
            let result = decrypt(&key, &vec![ENVELOPE_FORMAT_V1; len]);
            match result {
                Err(CryptoError::MalformedInput { min, .. }) => assert_eq!(min, MIN_ENVELOPE_LEN),
                other => panic!("length {len} must be rejected before opening, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_format_byte() {
        let key = test_key();
        let mut envelope = encrypt(&key, b"data").unwrap();
        envelope[0] = 0x7F;

        assert!(matches!(
            decrypt(&key, &envelope),
            Err(CryptoError::UnsupportedFormat(0x7F))
        ));
    }

    #[test]
    fn test_nonce_uniqueness() {
        let key = test_key();
        let mut nonces = HashSet::new();

        for _ in 0..10_000 {
            let envelope = encrypt(&key, b"same plaintext").unwrap();
            let nonce: [u8; NONCE_SIZE] = envelope
                [ENVELOPE_HEADER_SIZE..ENVELOPE_HEADER_SIZE + NONCE_SIZE]
                .try_into()
                .unwrap();
            nonces.insert(nonce);
        }

        assert_eq!(nonces.len(), 10_000);
    }

    #[test]
    fn test_envelope_key_version() {
        let key = SymmetricKey::from_bytes([7u8; KEY_SIZE], 42);
        let envelope = encrypt(&key, b"versioned").unwrap();

        assert_eq!(envelope_key_version(&envelope).unwrap(), 42);
        assert!(envelope_key_version(&envelope[..10]).is_err());
    }

    #[test]
    fn test_decrypt_legacy_envelope() {
        let key = test_key();
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).unwrap();
        let nonce = [9u8; NONCE_SIZE];
        let body = cipher
            .encrypt(Nonce::from_slice(&nonce), b"legacy".as_ref())
            .unwrap();

        let mut envelope = nonce.to_vec();
        envelope.extend_from_slice(&body);

        assert_eq!(decrypt_legacy(&key, &envelope).unwrap(), b"legacy");
        assert!(matches!(
            decrypt_legacy(&key, &envelope[..MIN_LEGACY_ENVELOPE_LEN - 1]),
            Err(CryptoError::MalformedInput { .. })
        ));
    }

    #[test]
    fn test_try_from_slice_rejects_wrong_length() {
        assert!(matches!(
            SymmetricKey::try_from_slice(&[0u8; 31], 1),
            Err(CryptoError::KeyFormat(_))
        ));
        assert!(SymmetricKey::try_from_slice(&[0u8; 33], 1).is_err());
        assert!(SymmetricKey::try_from_slice(&[0u8; 32], 1).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SymmetricKey::from_bytes([0xABu8; KEY_SIZE], 3);
        let rendered = format!("{key:?}");

        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("171"));
    }

    mod proptest_suite {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip(
                key_bytes in any::<[u8; KEY_SIZE]>(),
                plaintext in proptest::collection::vec(any::<u8>(), 0..=2048),
            ) {
                let key = SymmetricKey::from_bytes(key_bytes, 1);
                let envelope = encrypt(&key, &plaintext).unwrap();
                prop_assert_eq!(decrypt(&key, &envelope).unwrap(), plaintext);
            }

            #[test]
            fn single_bit_flip_is_rejected(
                plaintext in proptest::collection::vec(any::<u8>(), 0..=256),
                bit in any::<usize>(),
            ) {
                let key = test_key();
                let mut envelope = encrypt(&key, &plaintext).unwrap();
                // Anywhere after the format byte: key version, nonce, ciphertext, or tag
                let bits = (envelope.len() - 1) * 8;
                let bit = bit % bits;
                envelope[1 + bit / 8] ^= 1 << (bit % 8);

                prop_assert!(matches!(decrypt(&key, &envelope), Err(CryptoError::Authentication)));
            }
        }
    }
}
