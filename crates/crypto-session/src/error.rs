//! Crypto session error types

use shared_protocol::ProtocolError;
use thiserror::Error;

/// Cryptographic operation error
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Insufficient randomness: {0}")]
    InsufficientRandomness(String),

    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: authentication tag mismatch")]
    DecryptionFailed,
}

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Handshake error
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("Handshake crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Handshake channel error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;
