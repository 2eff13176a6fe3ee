//! Property-based tests for the session cryptography.

use proptest::prelude::*;

use crate::{
    CryptoError, ENCODED_PUBLIC_KEY_SIZE, KeyPair, KeySource, SessionCipher, decode_public_key,
    encode_public_key,
};

fn keypair(seed: u64) -> KeyPair {
    KeyPair::generate(&mut KeySource::seeded(seed)).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Decoding an encoded public key returns the same point.
    #[test]
    fn public_key_roundtrip(seed: u64) {
        let pair = keypair(seed);
        let encoded = encode_public_key(pair.public_key());

        prop_assert_eq!(encoded.as_bytes().len(), ENCODED_PUBLIC_KEY_SIZE);
        prop_assert_eq!(&decode_public_key(encoded.as_bytes()).unwrap(), pair.public_key());
    }

    /// Both sides of an exchange derive the same shared secret.
    #[test]
    fn ecdh_agreement(a in any::<u64>(), b in any::<u64>()) {
        prop_assume!(a != b);
        let alice = keypair(a);
        let bob = keypair(b);

        let ab = alice.diffie_hellman(bob.public_key());
        let ba = bob.diffie_hellman(alice.public_key());
        prop_assert_eq!(ab.raw_secret_bytes(), ba.raw_secret_bytes());
    }

    /// Any byte string of the wrong length is rejected as a malformed key.
    #[test]
    fn wrong_length_key_rejected(bytes in prop::collection::vec(any::<u8>(), 0..200)) {
        prop_assume!(bytes.len() != ENCODED_PUBLIC_KEY_SIZE);
        let result = decode_public_key(&bytes);
        prop_assert!(matches!(result, Err(CryptoError::MalformedKey(_))));
    }

    /// Sealing followed by opening on the peer returns the original plaintext.
    #[test]
    fn seal_open_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let alice = keypair(1);
        let bob = keypair(2);
        let sender = SessionCipher::establish(&alice, bob.public_key()).unwrap();
        let receiver = SessionCipher::establish(&bob, alice.public_key()).unwrap();

        let sealed = sender.seal(&plaintext).unwrap();
        prop_assert_eq!(receiver.open(&sealed.to_bytes()).unwrap(), plaintext);
    }

    /// Flipping any single bit of a sealed message makes opening fail.
    #[test]
    fn single_bit_tamper_detected(
        plaintext in prop::collection::vec(any::<u8>(), 0..128),
        position in any::<usize>(),
        bit in 0u8..8,
    ) {
        let alice = keypair(3);
        let bob = keypair(4);
        let sender = SessionCipher::establish(&alice, bob.public_key()).unwrap();
        let receiver = SessionCipher::establish(&bob, alice.public_key()).unwrap();

        let mut bytes = sender.seal(&plaintext).unwrap().to_bytes();
        let index = position % bytes.len();
        bytes[index] ^= 1 << bit;

        prop_assert!(matches!(receiver.open(&bytes), Err(CryptoError::DecryptionFailed)));
    }

    /// Sealing the same plaintext twice never yields the same bytes.
    #[test]
    fn same_plaintext_different_ciphertext(
        plaintext in prop::collection::vec(any::<u8>(), 1..100),
    ) {
        let alice = keypair(5);
        let bob = keypair(6);
        let sender = SessionCipher::establish(&alice, bob.public_key()).unwrap();

        let first = sender.seal(&plaintext).unwrap();
        let second = sender.seal(&plaintext).unwrap();
        prop_assert_ne!(first.to_bytes(), second.to_bytes());
    }
}
