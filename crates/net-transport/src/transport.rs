//! QUIC transport implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use quinn::{
    ClientConfig, Connection, Endpoint, IdleTimeout, RecvStream, SendStream, ServerConfig,
    TransportConfig,
};
use shared_protocol::PROTOCOL_ID;
use tracing::{debug, info, warn};

use crate::{SERVER_NAME, TransportError, TransportResult};

/// Idle time after which a silent connection is dropped
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Keep-alive interval, well below the idle timeout
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the endpoint to drain after close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// One bidirectional chat stream
pub struct ChatStream {
    send: SendStream,
    recv: RecvStream,
    remote: SocketAddr,
}

impl ChatStream {
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Split into read and write halves
    pub fn into_split(self) -> (RecvStream, SendStream) {
        (self.recv, self.send)
    }
}

/// QUIC endpoint carrying a single chat connection
pub struct ChatTransport {
    endpoint: Endpoint,
    connection: RwLock<Option<Connection>>,
}

impl ChatTransport {
    /// Create a dialing transport (client mode)
    pub async fn new_client(bind_addr: SocketAddr) -> TransportResult<Self> {
        let client_config = Self::create_client_config()?;

        let mut endpoint = Endpoint::client(bind_addr)?;
        endpoint.set_default_client_config(client_config);

        Ok(Self {
            endpoint,
            connection: RwLock::new(None),
        })
    }

    /// Create a listening transport (server mode)
    pub async fn new_server(bind_addr: SocketAddr) -> TransportResult<Self> {
        let server_config = Self::create_server_config()?;

        let endpoint = Endpoint::server(server_config, bind_addr)?;
        info!("Listening on {}", endpoint.local_addr()?);

        Ok(Self {
            endpoint,
            connection: RwLock::new(None),
        })
    }

    fn create_transport_config() -> TransportResult<TransportConfig> {
        let idle = IdleTimeout::try_from(IDLE_TIMEOUT)
            .map_err(|e| TransportError::Config(e.to_string()))?;

        let mut transport = TransportConfig::default();
        transport.max_idle_timeout(Some(idle));
        transport.keep_alive_interval(Some(KEEP_ALIVE_INTERVAL));

        Ok(transport)
    }

    /// Create client TLS config; the server certificate is not verified
    fn create_client_config() -> TransportResult<ClientConfig> {
        let mut crypto = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth();
        crypto.alpn_protocols = vec![PROTOCOL_ID.as_bytes().to_vec()];

        let mut config = ClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| TransportError::Tls(e.to_string()))?,
        ));
        config.transport_config(Arc::new(Self::create_transport_config()?));

        Ok(config)
    }

    /// Create server TLS config with a fresh self-signed certificate
    fn create_server_config() -> TransportResult<ServerConfig> {
        let certified_key = rcgen::generate_simple_self_signed(vec![SERVER_NAME.to_string()])
            .map_err(|e| TransportError::Certificate(e.to_string()))?;

        let cert_chain = vec![certified_key.cert.der().clone()];
        let key =
            rustls::pki_types::PrivatePkcs8KeyDer::from(certified_key.key_pair.serialize_der());

        let mut server_crypto = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, key.into())
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        server_crypto.alpn_protocols = vec![PROTOCOL_ID.as_bytes().to_vec()];

        let mut config = ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(server_crypto)
                .map_err(|e| TransportError::Tls(e.to_string()))?,
        ));
        config.transport_config(Arc::new(Self::create_transport_config()?));

        Ok(config)
    }

    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.endpoint.local_addr()?)
    }

    /// Connect to a listening peer and open the chat stream
    pub async fn open_stream(&self, addr: SocketAddr) -> TransportResult<ChatStream> {
        if self.connection.read().is_some() {
            return Err(TransportError::ConnectionFailed("already connected".into()));
        }

        info!("Connecting to {}", addr);

        let connection = self
            .endpoint
            .connect(addr, SERVER_NAME)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        info!("Connected to {}", addr);
        *self.connection.write() = Some(connection);

        Ok(ChatStream {
            send,
            recv,
            remote: addr,
        })
    }

    /// Wait for one peer to connect and open its chat stream
    ///
    /// Later connection attempts are refused; one chat partner at a time.
    pub async fn accept_stream(&self) -> TransportResult<ChatStream> {
        info!("Waiting for incoming connection...");

        let incoming = self
            .endpoint
            .accept()
            .await
            .ok_or_else(|| TransportError::ConnectionClosed("endpoint closed".into()))?;

        let connection = incoming
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        let remote = connection.remote_address();
        info!("Accepted connection from {}", remote);

        let (send, recv) = connection
            .accept_bi()
            .await
            .map_err(|e| TransportError::Stream(e.to_string()))?;

        *self.connection.write() = Some(connection);
        self.refuse_further_connections();

        Ok(ChatStream { send, recv, remote })
    }

    fn refuse_further_connections(&self) {
        let endpoint = self.endpoint.clone();
        tokio::spawn(async move {
            while let Some(incoming) = endpoint.accept().await {
                warn!(
                    "Refusing connection from {}: chat already in progress",
                    incoming.remote_address()
                );
                incoming.refuse();
            }
        });
    }

    pub fn is_connected(&self) -> bool {
        self.connection.read().is_some()
    }

    /// Wait up to `timeout` for the peer to close the connection
    ///
    /// Used after sending a final frame, so it is delivered before we exit.
    pub async fn linger(&self, timeout: Duration) {
        let connection = self.connection.read().clone();
        let Some(connection) = connection else {
            return;
        };

        match tokio::time::timeout(timeout, connection.closed()).await {
            Ok(reason) => debug!("Peer closed connection: {}", reason),
            Err(_) => debug!("Peer still connected after {:?}", timeout),
        }
    }

    /// Close the connection and let the endpoint drain
    pub async fn close(&self, reason: &str) {
        let connection = self.connection.write().take();
        if let Some(connection) = connection {
            connection.close(0u32.into(), reason.as_bytes());
            info!("Connection closed: {}", reason);
        }

        if tokio::time::timeout(CLOSE_TIMEOUT, self.endpoint.wait_idle())
            .await
            .is_err()
        {
            debug!("Endpoint did not drain within {:?}", CLOSE_TIMEOUT);
        }
    }
}

/// Accepts any server certificate
///
/// Peers are not authenticated at the transport layer; the chat handshake
/// runs on top with its own ephemeral keys.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        // rcgen signs self-signed certificates with ECDSA P-256 by default
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_loopback_stream() {
        let server = ChatTransport::new_server("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = ChatTransport::new_client("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let accept = async {
            let stream = server.accept_stream().await.unwrap();
            let (mut recv, mut send) = stream.into_split();
            let mut buf = [0u8; 5];
            recv.read_exact(&mut buf).await.unwrap();
            send.write_all(b"pong\n").await.unwrap();
            buf
        };

        let dial = async {
            let stream = client.open_stream(server_addr).await.unwrap();
            assert_eq!(stream.remote_address(), server_addr);
            let (mut recv, mut send) = stream.into_split();
            send.write_all(b"ping\n").await.unwrap();
            let mut buf = [0u8; 5];
            recv.read_exact(&mut buf).await.unwrap();
            buf
        };

        let (received_by_server, received_by_client) = tokio::join!(accept, dial);
        assert_eq!(&received_by_server, b"ping\n");
        assert_eq!(&received_by_client, b"pong\n");
        assert!(server.is_connected());
        assert!(client.is_connected());

        client.close("test done").await;
        assert!(!client.is_connected());
        server.linger(Duration::from_secs(2)).await;
        server.close("test done").await;
    }

    #[tokio::test]
    async fn test_open_stream_twice_fails() {
        let server = ChatTransport::new_server("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let client = ChatTransport::new_client("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();

        let accept = async {
            let stream = server.accept_stream().await.unwrap();
            let (mut recv, _send) = stream.into_split();
            let mut buf = [0u8; 1];
            recv.read_exact(&mut buf).await.unwrap();
        };
        let dial = async {
            let stream = client.open_stream(server_addr).await.unwrap();
            let (_recv, mut send) = stream.into_split();
            send.write_all(b"x").await.unwrap();
            send
        };
        let ((), _send) = tokio::join!(accept, dial);

        let err = client.open_stream(server_addr).await.err().unwrap();
        assert!(matches!(err, TransportError::ConnectionFailed(_)));
    }
}
