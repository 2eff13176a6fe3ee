//! chat - terminal P2P encrypted chat
//!
//! One peer listens, the other dials. Both generate ephemeral P-256 keys,
//! swap public keys over the stream and then exchange sealed chat lines
//! until one of them types `exit`.

mod cli;
mod config;
mod session;

use std::net::{Ipv4Addr, SocketAddr};

use anyhow::Context;
use clap::Parser;
use crypto_session::Handshake;
use net_transport::{ChatTransport, to_multiaddr};
use shared_protocol::{LineChannel, TerminationReason};
use tokio::io::BufReader;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::config::{ChatConfig, Mode};
use crate::session::ChatSession;

fn main() {
    let config = ChatConfig::from(Cli::parse());
    init_tracing(&config.log_filter);

    let code = match run(config) {
        Ok(reason) => {
            debug!("Exiting after {}", reason);
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    };

    // Stdin is read on a blocking thread that runtime shutdown would wait on
    std::process::exit(code);
}

/// Log to stderr so chat text on stdout stays clean
fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn run(config: ChatConfig) -> anyhow::Result<TerminationReason> {
    let bind_addr = config.bind_addr();

    let (transport, stream) = match config.mode {
        Mode::Listen { .. } => {
            let transport = ChatTransport::new_server(bind_addr)
                .await
                .context("failed to start listener")?;
            let local = transport.local_addr()?;
            let dial_addr = SocketAddr::from((Ipv4Addr::LOCALHOST, local.port()));

            println!("Run 'chat -d {}' in another console.", to_multiaddr(dial_addr));
            println!("You can replace 127.0.0.1 with public IP address as well.");
            println!("Waiting for incoming connection");
            println!();

            let stream = transport.accept_stream().await?;
            (transport, stream)
        }
        Mode::Dial { peer } => {
            let transport = ChatTransport::new_client(bind_addr)
                .await
                .context("failed to start dialer")?;
            println!("This node's address: {}", to_multiaddr(transport.local_addr()?));

            let stream = transport
                .open_stream(peer)
                .await
                .with_context(|| format!("failed to connect to {}", peer))?;
            println!("Established connection to destination");
            (transport, stream)
        }
    };
    info!("Chat stream open with {}", stream.remote_address());

    let mut key_source = config.key_source();
    let handshake = Handshake::generate(&mut key_source)?;

    let (recv, send) = stream.into_split();
    let session = match ChatSession::establish(LineChannel::new(recv, send), handshake).await {
        Ok(session) => session,
        Err(e) => {
            transport.close("handshake failed").await;
            return Err(e).context("handshake failed");
        }
    };

    debug!("Session {:?}", session.state());
    let state = session.state_handle();

    let input = BufReader::new(tokio::io::stdin());
    let result = session
        .run(input, tokio::io::stdout(), tokio::io::stdout())
        .await;
    debug!("Session {:?}", *state.read());

    match &result {
        Ok(TerminationReason::PeerExited) => {
            println!();
            println!("Peer exited chat!");
            transport.close("peer exited").await;
        }
        Ok(reason) => {
            // Give the peer time to read our last frame before we go
            transport.linger(config.linger).await;
            transport.close(&reason.to_string()).await;
        }
        Err(_) => transport.close("session error").await,
    }

    Ok(result?)
}
