//! Network Transport - QUIC-based byte streams for the chat tool
//!
//! Provides one ordered, reliable, bidirectional stream per chat
//! partner. No application-level encryption happens here; the TLS
//! layer QUIC requires is not used to authenticate peers.

mod address;
mod error;
mod transport;

pub use address::*;
pub use error::*;
pub use transport::*;

/// Server name presented in the self-signed certificate
pub const SERVER_NAME: &str = "chat.local";
