//! Crypto Session - End-to-End Encryption for chat sessions
//!
//! Ephemeral P-256 key agreement, HKDF-SHA256 key derivation and
//! XChaCha20Poly1305 message sealing, plus the public key handshake.

mod error;
mod handshake;
mod keys;
mod session;

#[cfg(test)]
mod proptests;

pub use error::*;
pub use handshake::*;
pub use keys::*;
pub use session::*;

/// P-256 field element size (256 bits / 32 bytes)
pub const FIELD_SIZE: usize = 32;

/// Encoded public key size: X and Y coordinates, each one field wide
pub const ENCODED_PUBLIC_KEY_SIZE: usize = 2 * FIELD_SIZE;

/// Symmetric key size (256 bits / 32 bytes)
pub const KEY_SIZE: usize = 32;

/// Nonce size for XChaCha20Poly1305 (192 bits / 24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (128 bits / 16 bytes)
pub const TAG_SIZE: usize = 16;
