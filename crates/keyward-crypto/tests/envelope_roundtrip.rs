//! End-to-end checks across the public keyward-crypto API: a symmetric key
//! wrapped for transport, then used for bulk data on the receiving side.

use keyward_crypto::codec::{
    decode_private_key_der, decode_public_key_pem, encode_private_key_der, encode_public_key_pem,
};
use keyward_crypto::{
    confirm_key_pair_match, decrypt, encrypt, generate_key_pair, open, seal, unwrap_symmetric_key,
    wrap_symmetric_key, CryptoError, SymmetricKey,
};

#[test]
fn wrapped_key_decrypts_bulk_data_after_export() {
    let (private, public) = generate_key_pair().unwrap();

    // Sender: only has the recipient's exported public key
    let public_pem = encode_public_key_pem(&public).unwrap();
    let recipient = decode_public_key_pem(&public_pem).unwrap();

    let data_key = SymmetricKey::generate(3).unwrap();
    let wrapped = wrap_symmetric_key(&recipient, &data_key).unwrap();
    let envelope = encrypt(&data_key, b"quarterly numbers").unwrap();

    // Recipient: reloads its private key from DER
    let private_der = encode_private_key_der(&private).unwrap();
    let reloaded = decode_private_key_der(&private_der).unwrap();
    assert!(confirm_key_pair_match(&recipient, &reloaded));

    let unwrapped = unwrap_symmetric_key(&reloaded, &wrapped, 3).unwrap();
    assert_eq!(
        decrypt(&unwrapped, &envelope).unwrap(),
        b"quarterly numbers"
    );
}

#[test]
fn sealed_message_only_opens_for_recipient() {
    let (alice_private, alice_public) = generate_key_pair().unwrap();
    let (bob_private, _) = generate_key_pair().unwrap();

    let sealed = seal(&alice_public, b"for alice").unwrap();

    assert_eq!(open(&alice_private, &sealed).unwrap(), b"for alice");
    assert!(matches!(
        open(&bob_private, &sealed),
        Err(CryptoError::Decryption)
    ));
}

#[test]
fn fixed_key_example() {
    let key = SymmetricKey::from_bytes([0x01; 32], 1);

    let first = encrypt(&key, b"hello").unwrap();
    let second = encrypt(&key, b"hello").unwrap();

    assert_ne!(first, second);
    assert_eq!(decrypt(&key, &first).unwrap(), b"hello");
    assert_eq!(decrypt(&key, &second).unwrap(), b"hello");
}
