//! Runtime configuration derived from the command line

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use crypto_session::KeySource;

use crate::cli::Cli;

/// How long a leaving peer waits for its final frame to be acknowledged
const DEFAULT_LINGER: Duration = Duration::from_secs(2);

/// Mixed into the dialer's debug seed so the two roles never share a key pair
const DIALER_SEED_TAG: u64 = 1 << 32;

/// Connection mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Wait for a peer to dial us
    Listen { port: u16 },
    /// Dial a listening peer
    Dial { peer: SocketAddr },
}

/// Chat configuration
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub mode: Mode,
    /// Seed for deterministic key generation, debug only
    pub debug_seed: Option<u64>,
    pub linger: Duration,
    pub log_filter: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Listen { port: 0 },
            debug_seed: None,
            linger: DEFAULT_LINGER,
            log_filter: "warn".to_string(),
        }
    }
}

impl From<Cli> for ChatConfig {
    fn from(cli: Cli) -> Self {
        let port = cli.source_port.unwrap_or(0);
        let (mode, seed) = match cli.dest {
            Some(peer) => (Mode::Dial { peer }, DIALER_SEED_TAG | u64::from(port)),
            None => (Mode::Listen { port }, u64::from(port)),
        };

        Self {
            mode,
            debug_seed: cli.debug.then_some(seed),
            log_filter: cli.log_level,
            ..Default::default()
        }
    }
}

impl ChatConfig {
    /// Randomness source for this run's session keys
    pub fn key_source(&self) -> KeySource {
        match self.debug_seed {
            Some(seed) => KeySource::seeded(seed),
            None => KeySource::os(),
        }
    }

    /// Local address to bind the transport to
    pub fn bind_addr(&self) -> SocketAddr {
        match self.mode {
            Mode::Listen { port } => SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            Mode::Dial { peer } if peer.is_ipv6() => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
            Mode::Dial { .. } => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        }
    }
}
