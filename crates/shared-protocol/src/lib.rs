//! Shared Protocol Definitions for the chat tool
//!
//! Wire constants, the line-delimited frame channel and the session
//! state machine shared by both peers.

mod error;
mod framing;
mod session;

pub use error::*;
pub use framing::*;
pub use session::*;

/// Protocol identifier negotiated by the transport (QUIC ALPN)
pub const PROTOCOL_ID: &str = "/chat/1.0.0";

/// Byte that terminates every frame on the wire
pub const FRAME_TERMINATOR: u8 = b'\n';

/// Maximum decoded payload carried by a single frame
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024;

/// Plaintext that ends the session when sent through the encrypted channel
pub const TERMINATION_KEYWORD: &str = "exit";
