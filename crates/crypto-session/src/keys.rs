//! Ephemeral P-256 key pairs and the fixed-width public key codec

use p256::ecdh::SharedSecret;
use p256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use p256::{EncodedPoint, FieldBytes, PublicKey, SecretKey};
use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::{CryptoError, CryptoResult, ENCODED_PUBLIC_KEY_SIZE, FIELD_SIZE};

/// Scalar candidates drawn before giving up on a randomness source
const MAX_KEYGEN_ATTEMPTS: usize = 8;

/// Randomness source for key generation
pub enum KeySource {
    /// Operating system CSPRNG
    Os(OsRng),
    /// Deterministic generator for debugging; never use for real chats
    Seeded(StdRng),
}

impl KeySource {
    pub fn os() -> Self {
        Self::Os(OsRng)
    }

    pub fn seeded(seed: u64) -> Self {
        warn!(
            "Using deterministic key source (seed {}), session keys are predictable",
            seed
        );
        Self::Seeded(StdRng::seed_from_u64(seed))
    }

    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Seeded(_))
    }
}

impl Default for KeySource {
    fn default() -> Self {
        Self::os()
    }
}

impl RngCore for KeySource {
    fn next_u32(&mut self) -> u32 {
        match self {
            Self::Os(rng) => rng.next_u32(),
            Self::Seeded(rng) => rng.next_u32(),
        }
    }

    fn next_u64(&mut self) -> u64 {
        match self {
            Self::Os(rng) => rng.next_u64(),
            Self::Seeded(rng) => rng.next_u64(),
        }
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        match self {
            Self::Os(rng) => rng.fill_bytes(dest),
            Self::Seeded(rng) => rng.fill_bytes(dest),
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        match self {
            Self::Os(rng) => rng.try_fill_bytes(dest),
            Self::Seeded(rng) => rng.try_fill_bytes(dest),
        }
    }
}

impl CryptoRng for KeySource {}

/// Key pair for one session's key exchange
///
/// The secret scalar is zeroized when the pair is dropped.
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new ephemeral key pair from `rng`
    ///
    /// Fails with [`CryptoError::InsufficientRandomness`] if the source
    /// errors, or keeps producing scalars outside `[1, n)`.
    pub fn generate<R>(rng: &mut R) -> CryptoResult<Self>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        for attempt in 1..=MAX_KEYGEN_ATTEMPTS {
            let mut candidate = Zeroizing::new([0u8; FIELD_SIZE]);
            rng.try_fill_bytes(&mut candidate[..])
                .map_err(|e| CryptoError::InsufficientRandomness(e.to_string()))?;

            match SecretKey::from_bytes(FieldBytes::from_slice(&candidate[..])) {
                Ok(secret) => {
                    let public = secret.public_key();
                    return Ok(Self { secret, public });
                }
                Err(_) => debug!("Rejected scalar candidate {}", attempt),
            }
        }

        Err(CryptoError::InsufficientRandomness(format!(
            "no valid scalar after {} attempts",
            MAX_KEYGEN_ATTEMPTS
        )))
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the public key in its wire encoding
    pub fn encoded_public_key(&self) -> EncodedPublicKey {
        encode_public_key(&self.public)
    }

    /// Perform Diffie-Hellman key agreement with the peer's public point
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> SharedSecret {
        p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), their_public.as_affine())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.encoded_public_key())
            .finish_non_exhaustive()
    }
}

/// Public point as X || Y, each coordinate big-endian and one field wide
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct EncodedPublicKey([u8; ENCODED_PUBLIC_KEY_SIZE]);

impl EncodedPublicKey {
    /// Check the length only; see [`decode_public_key`] for point validation
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; ENCODED_PUBLIC_KEY_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::MalformedKey(format!(
                "expected {} bytes, got {}",
                ENCODED_PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; ENCODED_PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn x(&self) -> &[u8] {
        &self.0[..FIELD_SIZE]
    }

    pub fn y(&self) -> &[u8] {
        &self.0[FIELD_SIZE..]
    }

    /// Validate the coordinates and recover the curve point
    pub fn to_public_key(&self) -> CryptoResult<PublicKey> {
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(self.x()),
            FieldBytes::from_slice(self.y()),
            false,
        );

        Option::<PublicKey>::from(PublicKey::from_encoded_point(&point))
            .ok_or_else(|| CryptoError::MalformedKey("coordinates are not a point on P-256".into()))
    }
}

impl std::fmt::Debug for EncodedPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncodedPublicKey(")?;
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, "..)")
    }
}

/// Encode a public point at fixed width
pub fn encode_public_key(public: &PublicKey) -> EncodedPublicKey {
    // Uncompressed SEC1 is 0x04 || X || Y with both coordinates zero-padded
    let point = public.to_encoded_point(false);
    let mut encoded = [0u8; ENCODED_PUBLIC_KEY_SIZE];
    encoded.copy_from_slice(&point.as_bytes()[1..]);
    EncodedPublicKey(encoded)
}

/// Decode and validate a peer's public point
pub fn decode_public_key(bytes: &[u8]) -> CryptoResult<PublicKey> {
    EncodedPublicKey::from_slice(bytes)?.to_public_key()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Source that always fails
    struct BrokenRng;

    impl RngCore for BrokenRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, _dest: &mut [u8]) {}

        fn try_fill_bytes(&mut self, _dest: &mut [u8]) -> Result<(), rand::Error> {
            Err(rand::Error::new("entropy source unavailable"))
        }
    }

    impl CryptoRng for BrokenRng {}

    /// Source stuck on a single byte value
    struct StuckRng(u8);

    impl RngCore for StuckRng {
        fn next_u32(&mut self) -> u32 {
            u32::from_ne_bytes([self.0; 4])
        }

        fn next_u64(&mut self) -> u64 {
            u64::from_ne_bytes([self.0; 8])
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            dest.fill(self.0);
            Ok(())
        }
    }

    impl CryptoRng for StuckRng {}

    #[test]
    fn test_generate_with_os_source() {
        let a = KeyPair::generate(&mut KeySource::os()).unwrap();
        let b = KeyPair::generate(&mut KeySource::os()).unwrap();
        assert_ne!(a.encoded_public_key(), b.encoded_public_key());
    }

    #[test]
    fn test_seeded_generation_is_deterministic() {
        let a = KeyPair::generate(&mut KeySource::seeded(4001)).unwrap();
        let b = KeyPair::generate(&mut KeySource::seeded(4001)).unwrap();
        let c = KeyPair::generate(&mut KeySource::seeded(4002)).unwrap();

        assert_eq!(a.encoded_public_key(), b.encoded_public_key());
        assert_ne!(a.encoded_public_key(), c.encoded_public_key());
        assert!(KeySource::seeded(1).is_deterministic());
        assert!(!KeySource::os().is_deterministic());
    }

    #[test]
    fn test_failing_source_is_insufficient_randomness() {
        let err = KeyPair::generate(&mut BrokenRng).unwrap_err();
        assert!(matches!(err, CryptoError::InsufficientRandomness(_)));
    }

    #[test]
    fn test_stuck_source_is_insufficient_randomness() {
        // All-zero and all-0xff scalars are both outside [1, n)
        for byte in [0x00, 0xff] {
            let err = KeyPair::generate(&mut StuckRng(byte)).unwrap_err();
            assert!(matches!(err, CryptoError::InsufficientRandomness(_)));
        }
    }

    #[test]
    fn test_encoded_width_and_layout() {
        let pair = KeyPair::generate(&mut KeySource::os()).unwrap();
        let encoded = pair.encoded_public_key();
        let sec1 = pair.public_key().to_encoded_point(false);

        assert_eq!(encoded.as_bytes().len(), ENCODED_PUBLIC_KEY_SIZE);
        assert_eq!(encoded.x(), sec1.x().unwrap().as_slice());
        assert_eq!(encoded.y(), sec1.y().unwrap().as_slice());
    }

    #[test]
    fn test_leading_zero_coordinate_keeps_width() {
        let pair = (0u64..4096)
            .map(|seed| KeyPair::generate(&mut KeySource::seeded(seed)).unwrap())
            .find(|pair| pair.encoded_public_key().x()[0] == 0)
            .expect("a key with a leading zero X byte");

        let encoded = pair.encoded_public_key();
        assert_eq!(encoded.as_bytes().len(), ENCODED_PUBLIC_KEY_SIZE);
        assert_eq!(&decode_public_key(encoded.as_bytes()).unwrap(), pair.public_key());
    }

    #[test]
    fn test_leading_zero_y_coordinate_keeps_width() {
        let pair = (0u64..4096)
            .map(|seed| KeyPair::generate(&mut KeySource::seeded(seed)).unwrap())
            .find(|pair| pair.encoded_public_key().y()[0] == 0)
            .expect("a key with a leading zero Y byte");

        let encoded = pair.encoded_public_key();
        assert_eq!(encoded.as_bytes().len(), ENCODED_PUBLIC_KEY_SIZE);
        assert_eq!(encoded.y().len(), FIELD_SIZE);
        assert_eq!(&decode_public_key(encoded.as_bytes()).unwrap(), pair.public_key());
    }

    #[test]
    fn test_decode_rejects_wrong_lengths() {
        let pair = KeyPair::generate(&mut KeySource::os()).unwrap();
        let encoded = pair.encoded_public_key();

        for len in [0, 1, 32, 63, 65, 128] {
            let mut bytes = encoded.as_bytes().to_vec();
            bytes.resize(len, 0);
            let err = decode_public_key(&bytes).unwrap_err();
            assert!(matches!(err, CryptoError::MalformedKey(_)), "length {}", len);
        }
    }

    #[test]
    fn test_decode_rejects_sec1_prefixed_key() {
        let pair = KeyPair::generate(&mut KeySource::os()).unwrap();
        let sec1 = pair.public_key().to_encoded_point(false);

        let err = decode_public_key(sec1.as_bytes()).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedKey(_)));
    }

    #[test]
    fn test_decode_rejects_off_curve_point() {
        let err = decode_public_key(&[0u8; ENCODED_PUBLIC_KEY_SIZE]).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedKey(_)));

        let pair = KeyPair::generate(&mut KeySource::os()).unwrap();
        let mut bytes = *pair.encoded_public_key().as_bytes();
        bytes[ENCODED_PUBLIC_KEY_SIZE - 1] ^= 0x01;
        let err = decode_public_key(&bytes).unwrap_err();
        assert!(matches!(err, CryptoError::MalformedKey(_)));
    }

    #[test]
    fn test_debug_hides_secret() {
        let pair = KeyPair::generate(&mut KeySource::os()).unwrap();
        let rendered = format!("{:?}", pair);
        assert!(rendered.starts_with("KeyPair"));
        assert!(rendered.contains("EncodedPublicKey("));
    }
}
