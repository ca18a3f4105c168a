//! RSA keypairs and PKCS#1 v1.5 encryption for small payloads and key wrapping

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{CryptoError, CryptoResult};
use crate::{PKCS1_V15_OVERHEAD, RSA_MODULUS_BITS};

/// An RSA private key. Owns its public half.
///
/// The underlying key zeroizes its secret components on drop.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

/// An RSA public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PrivateKey {
    pub(crate) fn from_inner(inner: RsaPrivateKey) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &RsaPrivateKey {
        &self.inner
    }

    /// Derive the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_inner(self.inner.to_public_key())
    }

    /// Modulus size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.inner.size()
    }

    /// Decrypt a PKCS#1 v1.5 ciphertext.
    ///
    /// Every failure is the same [`CryptoError::Decryption`].
    pub fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        self.inner
            .decrypt(Pkcs1v15Encrypt, ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &(self.size_bytes() * 8))
            .field("components", &"[REDACTED]")
            .finish()
    }
}

impl PublicKey {
    pub(crate) fn from_inner(inner: RsaPublicKey) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &RsaPublicKey {
        &self.inner
    }

    /// Modulus size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.inner.size()
    }

    /// Largest plaintext PKCS#1 v1.5 can carry under this key.
    pub fn max_payload_len(&self) -> usize {
        self.size_bytes().saturating_sub(PKCS1_V15_OVERHEAD)
    }

    /// Encrypt with PKCS#1 v1.5 padding drawn from the OS random source.
    pub fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let max = self.max_payload_len();
        if plaintext.len() > max {
            return Err(CryptoError::PayloadTooLarge {
                len: plaintext.len(),
                max,
            });
        }

        self.inner
            .encrypt(&mut OsRng, Pkcs1v15Encrypt, plaintext)
            .map_err(|e| CryptoError::Encryption(format!("RSA PKCS#1 v1.5: {e}")))
    }
}

/// Generate a 2048-bit RSA keypair.
pub fn generate_key_pair() -> CryptoResult<(PrivateKey, PublicKey)> {
    generate_key_pair_with_bits(RSA_MODULUS_BITS)
}

/// Generate an RSA keypair with a modulus of at least 2048 bits.
pub fn generate_key_pair_with_bits(bits: usize) -> CryptoResult<(PrivateKey, PublicKey)> {
    if bits < RSA_MODULUS_BITS {
        return Err(CryptoError::KeyGen(format!(
            "modulus of {bits} bits is below the {RSA_MODULUS_BITS}-bit minimum"
        )));
    }

    let inner = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::KeyGen(format!("RSA-{bits}: {e}")))?;
    let private = PrivateKey::from_inner(inner);
    let public = private.public_key();

    tracing::debug!(bits, "generated RSA keypair");
    Ok((private, public))
}

pub fn public_key_from_private(private: &PrivateKey) -> PublicKey {
    private.public_key()
}

pub fn encrypt_with_public_key(public: &PublicKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    public.encrypt(plaintext)
}

pub fn decrypt_with_private_key(private: &PrivateKey, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
    private.decrypt(ciphertext)
}

/// Check that `public` is the public half of `private`.
///
/// Compares modulus and exponent, so two encodings of one key still match.
pub fn confirm_key_pair_match(public: &PublicKey, private: &PrivateKey) -> bool {
    let derived = private.inner().to_public_key();
    derived.n() == public.inner().n() && derived.e() == public.inner().e()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    // RSA generation is slow in debug builds; share two pairs across tests.
    fn pair_a() -> &'static (PrivateKey, PublicKey) {
        static PAIR: OnceLock<(PrivateKey, PublicKey)> = OnceLock::new();
        PAIR.get_or_init(|| generate_key_pair().unwrap())
    }

    fn pair_b() -> &'static (PrivateKey, PublicKey) {
        static PAIR: OnceLock<(PrivateKey, PublicKey)> = OnceLock::new();
        PAIR.get_or_init(|| generate_key_pair().unwrap())
    }

    #[test]
    fn test_key_size() {
        let (private, public) = pair_a();
        assert_eq!(private.size_bytes(), 256);
        assert_eq!(public.size_bytes(), 256);
        assert_eq!(public.max_payload_len(), 245);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (private, public) = pair_a();
        let plaintext = b"wrap me";

        let ciphertext = encrypt_with_public_key(public, plaintext).unwrap();
        assert_eq!(ciphertext.len(), 256);
        let decrypted = decrypt_with_private_key(private, &ciphertext).unwrap();

        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let (private, public) = pair_a();
        let plaintext = vec![0x5Au8; public.max_payload_len()];

        let ciphertext = public.encrypt(&plaintext).unwrap();
        assert_eq!(private.decrypt(&ciphertext).unwrap(), plaintext);
    }

    #[test]
    fn test_payload_too_large() {
        let (_, public) = pair_a();
        let plaintext = vec![0u8; public.max_payload_len() + 1];

        assert!(matches!(
            public.encrypt(&plaintext),
            Err(CryptoError::PayloadTooLarge { len: 246, max: 245 })
        ));
    }

    #[test]
    fn test_randomized_padding() {
        let (_, public) = pair_a();
        let a = public.encrypt(b"same").unwrap();
        let b = public.encrypt(b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_decrypt_wrong_private_key() {
        let (_, public) = pair_a();
        let (other_private, _) = pair_b();

        let ciphertext = public.encrypt(b"for a only").unwrap();
        let result = other_private.decrypt(&ciphertext);

        // Either the opaque error or (rarely) garbage that happens to unpad;
        // it must never be the original plaintext.
        match result {
            Err(e) => assert!(matches!(e, CryptoError::Decryption)),
            Ok(p) => assert_ne!(p, b"for a only"),
        }
    }

    #[test]
    fn test_decrypt_garbage_is_opaque() {
        let (private, _) = pair_a();

        for input in [vec![], vec![0u8; 10], vec![0xFFu8; 256], vec![1u8; 300]] {
            assert!(matches!(
                private.decrypt(&input),
                Err(CryptoError::Decryption)
            ));
        }
    }

    #[test]
    fn test_confirm_key_pair_match() {
        let (private_a, public_a) = pair_a();
        let (private_b, public_b) = pair_b();

        assert!(confirm_key_pair_match(public_a, private_a));
        assert!(confirm_key_pair_match(&public_key_from_private(private_b), private_b));
        assert!(!confirm_key_pair_match(public_b, private_a));
        assert!(!confirm_key_pair_match(public_a, private_b));
    }

    #[test]
    fn test_reject_small_modulus() {
        assert!(matches!(
            generate_key_pair_with_bits(1024),
            Err(CryptoError::KeyGen(_))
        ));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let (private, _) = pair_a();
        let rendered = format!("{private:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(rendered.contains("2048"));
    }
}
