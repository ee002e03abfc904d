use crate::error::{Error, Result};
use p384::ecdh::EphemeralSecret;
use p384::PublicKey;
use rand::rngs::OsRng;

/// Length in bytes of an uncompressed P-384 point: a 1-byte tag plus two
/// 48-byte field elements. Any public key received during the handshake that
/// isn't exactly this length is rejected (spec: "public key received isn't
/// valid length 97").
pub const PUBLIC_KEY_LEN: usize = 97;

/// An ephemeral key pair generated fresh for one handshake. Never reused
/// across connections or reconnects.
pub struct EphemeralKeyPair {
    pub(crate) secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generates a new ephemeral key pair using the OS RNG.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = PublicKey::from(&secret);
        EphemeralKeyPair { secret, public }
    }

    /// Encodes the public half as an uncompressed SEC1 point, the wire
    /// format exchanged during the handshake.
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let encoded = self.public.to_encoded_point(false);
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out.copy_from_slice(encoded.as_bytes());
        out
    }
}

/// Parses a peer's public key off the wire, validating its length and that
/// it decodes to a point on the curve.
pub fn parse_remote_public_key(bytes: &[u8]) -> Result<PublicKey> {
    if bytes.len() != PUBLIC_KEY_LEN {
        return Err(Error::InvalidPublicKeyLength(bytes.len()));
    }

    PublicKey::from_sec1_bytes(bytes).map_err(|_| Error::InvalidPublicKey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_bytes_are_97_long() {
        let pair = EphemeralKeyPair::generate();
        assert_eq!(pair.public_key_bytes().len(), PUBLIC_KEY_LEN);
    }

    #[test]
    fn rejects_wrong_length_public_key() {
        let err = parse_remote_public_key(&[0u8; 1]).unwrap_err();
        assert!(matches!(err, Error::InvalidPublicKeyLength(1)));
    }

    #[test]
    fn round_trips_a_generated_public_key() {
        let pair = EphemeralKeyPair::generate();
        let bytes = pair.public_key_bytes();
        assert!(parse_remote_public_key(&bytes).is_ok());
    }
}
