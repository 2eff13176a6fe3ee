//! Command-line interface

use std::net::SocketAddr;

use clap::Parser;
use net_transport::parse_peer_address;

#[derive(Debug, Parser)]
#[command(
    name = "chat",
    version,
    about = "A terminal-based P2P encrypted chat app.",
    after_help = "Run 'chat -p <SOURCE_PORT>' where <SOURCE_PORT> can be any port number.\n\
                  Then run 'chat -d <ADDR>' in another console, where <ADDR> is the address \
                  printed by the listener."
)]
pub struct Cli {
    /// Port to listen on for an incoming chat (0 lets the OS choose)
    #[arg(short = 'p', long, value_name = "PORT", conflicts_with = "dest")]
    pub source_port: Option<u16>,

    /// Listening peer to dial: ip:port or /ip4/<ip>/udp/<port>
    #[arg(short, long, value_name = "ADDR", value_parser = parse_peer_address)]
    pub dest: Option<SocketAddr>,

    /// Generate the same session keys on every run (seeded from the source port)
    #[arg(long)]
    pub debug: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, value_name = "FILTER", default_value = "warn")]
    pub log_level: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_listen_mode() {
        let cli = Cli::try_parse_from(["chat", "-p", "4001"]).unwrap();
        assert_eq!(cli.source_port, Some(4001));
        assert!(cli.dest.is_none());
        assert!(!cli.debug);
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_dial_mode_accepts_multiaddr() {
        let cli = Cli::try_parse_from(["chat", "-d", "/ip4/127.0.0.1/udp/4001"]).unwrap();
        assert_eq!(cli.dest, Some("127.0.0.1:4001".parse().unwrap()));
    }

    #[test]
    fn test_modes_are_exclusive() {
        assert!(Cli::try_parse_from(["chat", "-p", "4001", "-d", "127.0.0.1:4001"]).is_err());
    }

    #[test]
    fn test_bad_dest_rejected() {
        assert!(Cli::try_parse_from(["chat", "-d", "not-an-address"]).is_err());
    }
}
