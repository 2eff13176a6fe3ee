//! Peer address parsing
//!
//! Accepts plain socket addresses (`127.0.0.1:4001`, `[::1]:4001`) and
//! multiaddr-style paths (`/ip4/127.0.0.1/udp/4001/quic-v1`).

use std::net::{IpAddr, SocketAddr};

use crate::{TransportError, TransportResult};

/// Parse a peer address given on the command line
pub fn parse_peer_address(input: &str) -> TransportResult<SocketAddr> {
    let input = input.trim();
    if input.starts_with('/') {
        parse_multiaddr(input)
    } else {
        input
            .parse()
            .map_err(|_| TransportError::AddressParse(format!("invalid socket address: {}", input)))
    }
}

fn parse_multiaddr(input: &str) -> TransportResult<SocketAddr> {
    let parts: Vec<&str> = input.split('/').skip(1).collect();

    let (ip, port) = match parts.as_slice() {
        [family, ip, "udp", port] | [family, ip, "udp", port, "quic-v1"] => {
            let ip: IpAddr = ip
                .parse()
                .map_err(|_| TransportError::AddressParse(format!("invalid IP: {}", ip)))?;
            match (*family, ip) {
                ("ip4", IpAddr::V4(_)) | ("ip6", IpAddr::V6(_)) => {}
                _ => {
                    return Err(TransportError::AddressParse(format!(
                        "address family mismatch: /{}/{}",
                        family, ip
                    )));
                }
            }
            (ip, port)
        }
        _ => {
            return Err(TransportError::AddressParse(format!(
                "expected /ip4/<ip>/udp/<port>, got {}",
                input
            )));
        }
    };

    let port: u16 = port
        .parse()
        .map_err(|_| TransportError::AddressParse(format!("invalid port: {}", port)))?;

    Ok(SocketAddr::new(ip, port))
}

/// Format an address the way [`parse_peer_address`] reads multiaddrs
pub fn to_multiaddr(addr: SocketAddr) -> String {
    let family = if addr.is_ipv4() { "ip4" } else { "ip6" };
    format!("/{}/{}/udp/{}/quic-v1", family, addr.ip(), addr.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_address() {
        let addr = parse_peer_address("127.0.0.1:4001").unwrap();
        assert_eq!(addr, "127.0.0.1:4001".parse().unwrap());

        let addr = parse_peer_address(" [::1]:9000 ").unwrap();
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_multiaddr() {
        let addr = parse_peer_address("/ip4/10.0.0.7/udp/4001").unwrap();
        assert_eq!(addr, "10.0.0.7:4001".parse().unwrap());

        let addr = parse_peer_address("/ip6/::1/udp/4001/quic-v1").unwrap();
        assert_eq!(addr, "[::1]:4001".parse().unwrap());
    }

    #[test]
    fn test_multiaddr_roundtrip() {
        let addr: SocketAddr = "192.168.1.20:51000".parse().unwrap();
        assert_eq!(parse_peer_address(&to_multiaddr(addr)).unwrap(), addr);
    }

    #[test]
    fn test_rejects_bad_addresses() {
        for input in [
            "",
            "localhost",
            "127.0.0.1",
            "/ip4/127.0.0.1/tcp/4001",
            "/ip4/::1/udp/4001",
            "/ip4/127.0.0.1/udp/99999",
            "/ip4/127.0.0.1/udp/4001/p2p/QmPeer",
        ] {
            let err = parse_peer_address(input).unwrap_err();
            assert!(matches!(err, TransportError::AddressParse(_)), "{}", input);
        }
    }
}
