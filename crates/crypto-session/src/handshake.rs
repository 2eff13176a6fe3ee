//! Ephemeral public key exchange over a [`LineChannel`]
//!
//! Each side sends its encoded public key as one frame and receives the
//! peer's as one frame. Both happen concurrently, so neither peer has to
//! act as initiator. Nothing binds the exchanged keys to a long-term
//! identity: an active man-in-the-middle on the transport is not detected.

use p256::PublicKey;
use rand::{CryptoRng, RngCore};
use shared_protocol::LineChannel;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::{
    CryptoError, CryptoResult, EncodedPublicKey, HandshakeResult, KeyPair, SessionCipher,
    decode_public_key, encode_public_key,
};

/// Pending key exchange holding our fresh key pair
pub struct Handshake {
    keypair: KeyPair,
}

impl Handshake {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }

    /// Start a handshake with a key pair drawn from `rng`
    pub fn generate<R>(rng: &mut R) -> CryptoResult<Self>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        Ok(Self::new(KeyPair::generate(rng)?))
    }

    /// Get our public key to send to the peer
    pub fn public_key(&self) -> EncodedPublicKey {
        self.keypair.encoded_public_key()
    }

    /// Send our key and receive the peer's, exactly one frame each way
    pub async fn exchange<R, W>(
        self,
        channel: &mut LineChannel<R, W>,
    ) -> HandshakeResult<HandshakeOutcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let own = self.public_key();
        let (reader, writer) = channel.halves_mut();

        debug!("Exchanging ephemeral public keys");
        let ((), frame) =
            tokio::try_join!(writer.send_frame(own.as_bytes()), reader.receive_frame())?;

        let peer_public = decode_public_key(&frame)?;
        if encode_public_key(&peer_public) == own {
            return Err(CryptoError::MalformedKey("peer echoed our public key".into()).into());
        }

        info!("Handshake complete");
        Ok(HandshakeOutcome {
            keypair: self.keypair,
            peer_public,
        })
    }
}

/// Material needed to build both directions of a [`SessionCipher`]
pub struct HandshakeOutcome {
    keypair: KeyPair,
    peer_public: PublicKey,
}

impl HandshakeOutcome {
    pub fn own_public(&self) -> &PublicKey {
        self.keypair.public_key()
    }

    pub fn peer_public(&self) -> &PublicKey {
        &self.peer_public
    }

    /// Derive the session cipher; the key pair is dropped (and zeroized) here
    pub fn into_cipher(self) -> CryptoResult<SessionCipher> {
        SessionCipher::establish(&self.keypair, &self.peer_public)
    }
}
