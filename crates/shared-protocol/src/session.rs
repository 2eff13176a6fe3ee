//! Session state machine

use crate::{ProtocolError, ProtocolResult, TERMINATION_KEYWORD};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Exchanging ephemeral public keys
    Handshaking,
    /// Keys agreed, chat lines flowing in both directions
    Active,
    /// Session ended; absorbing
    Terminated,
}

impl SessionState {
    /// Validate a transition and return the new state
    pub fn transition(self, to: SessionState) -> ProtocolResult<SessionState> {
        match (self, to) {
            (Self::Handshaking, Self::Active)
            | (Self::Handshaking, Self::Terminated)
            | (Self::Active, Self::Terminated) => Ok(to),
            (from, to) => Err(ProtocolError::InvalidStateTransition { from, to }),
        }
    }

    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }
}

/// Why a session entered [`SessionState::Terminated`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Local user typed the termination keyword
    LocalExit,
    /// Peer sent the termination keyword
    PeerExited,
    /// Local input reached end-of-file
    InputClosed,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalExit => write!(f, "local exit"),
            Self::PeerExited => write!(f, "peer exited"),
            Self::InputClosed => write!(f, "input closed"),
        }
    }
}

/// Whether a chat line is the termination keyword (surrounding whitespace ignored)
pub fn is_termination(line: &str) -> bool {
    line.trim() == TERMINATION_KEYWORD
}
