//! Session cipher: HKDF-SHA256 key derivation + XChaCha20Poly1305 sealing

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit},
};
use hkdf::Hkdf;
use p256::PublicKey;
use p256::ecdh::SharedSecret;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{
    CryptoError, CryptoResult, EncodedPublicKey, KEY_SIZE, KeyPair, NONCE_SIZE, TAG_SIZE,
    encode_public_key,
};

/// HKDF salt, fixed per protocol version
const KDF_SALT: &[u8] = b"/chat/1.0.0 session salt";

/// HKDF info prefix; the sender and receiver keys follow it
const KDF_LABEL: &[u8] = b"chat message key";

/// Derive the key for messages flowing from `sender` to `receiver`
///
/// Binding both encoded keys into `info` gives each direction its own key,
/// so the two peers never seal under the same key.
fn derive_direction_key(
    shared: &SharedSecret,
    sender: &EncodedPublicKey,
    receiver: &EncodedPublicKey,
) -> CryptoResult<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), shared.raw_secret_bytes());

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand_multi_info(
        &[KDF_LABEL, sender.as_bytes(), receiver.as_bytes()],
        &mut key[..],
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    Ok(key)
}

fn cipher_from_key(key: &[u8; KEY_SIZE]) -> CryptoResult<XChaCha20Poly1305> {
    XChaCha20Poly1305::new_from_slice(key).map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// One sealed chat line
///
/// Wire layout: [24-byte nonce][ciphertext][16-byte auth tag]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the tag appended
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Split a wire payload; too short to hold a nonce and tag is a decryption failure
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::DecryptionFailed);
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        Ok(Self {
            nonce: nonce_bytes,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Sealing context: own private key + peer's public key
pub struct Sealer {
    cipher: XChaCha20Poly1305,
}

impl Sealer {
    /// Encrypt a chat line under a fresh random nonce
    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<EncryptedMessage> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|e| CryptoError::InsufficientRandomness(e.to_string()))?;

        let ciphertext = self
            .cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        Ok(EncryptedMessage { nonce, ciphertext })
    }
}

/// Opening context: own private key + peer's public key, reverse direction
pub struct Opener {
    cipher: XChaCha20Poly1305,
}

impl Opener {
    /// Decrypt and verify a wire payload
    pub fn open(&self, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        self.open_message(&EncryptedMessage::from_bytes(payload)?)
    }

    pub fn open_message(&self, message: &EncryptedMessage) -> CryptoResult<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(&message.nonce), message.ciphertext.as_slice())
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// Both directions of an established session
///
/// Contexts are read-only after construction; nonces are random so no
/// per-message state needs to be shared between senders.
pub struct SessionCipher {
    sealer: Sealer,
    opener: Opener,
}

impl SessionCipher {
    /// Derive both directions from our key pair and the peer's public point
    pub fn establish(own: &KeyPair, peer_public: &PublicKey) -> CryptoResult<Self> {
        let shared = own.diffie_hellman(peer_public);
        let own_encoded = own.encoded_public_key();
        let peer_encoded = encode_public_key(peer_public);

        let seal_key = derive_direction_key(&shared, &own_encoded, &peer_encoded)?;
        let open_key = derive_direction_key(&shared, &peer_encoded, &own_encoded)?;

        debug!("Derived session keys for peer {:?}", peer_encoded);

        Ok(Self {
            sealer: Sealer {
                cipher: cipher_from_key(&seal_key)?,
            },
            opener: Opener {
                cipher: cipher_from_key(&open_key)?,
            },
        })
    }

    pub fn seal(&self, plaintext: &[u8]) -> CryptoResult<EncryptedMessage> {
        self.sealer.seal(plaintext)
    }

    pub fn open(&self, payload: &[u8]) -> CryptoResult<Vec<u8>> {
        self.opener.open(payload)
    }

    /// Separate the contexts for use on independent tasks
    pub fn split(self) -> (Sealer, Opener) {
        (self.sealer, self.opener)
    }
}
