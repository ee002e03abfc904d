use crate::error::{Error, Result};
use crate::keys::EphemeralKeyPair;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use p384::PublicKey;
use rand::RngCore;
use sha2::Sha384;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Bytes a sealed body carries beyond the plaintext: the prepended random
/// nonce plus the Poly1305 authentication tag. Callers sizing a read-side
/// frame bound for an encrypted channel need to add this on top of the
/// plaintext bound.
pub const AEAD_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// A session implements the AEAD channel described in §4.3: it wraps
/// plaintext `[type||payload]` frame bodies into ciphertext before they are
/// length-prefixed by the codec, and unwraps them on read. Established once,
/// per connection, immediately after a successful encrypted handshake.
pub trait Session {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn open(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Single symmetric AEAD key shared by both peers, derived from an ECDH
/// shared secret. The same key encrypts and decrypts in both directions; a
/// random nonce is prepended to every ciphertext so a key is never reused
/// under the same nonce (spec's recommended strategy).
pub struct AeadSession {
    cipher: ChaCha20Poly1305,
}

impl AeadSession {
    /// Completes the key-agreement leg of the handshake: consumes this
    /// side's ephemeral secret and the peer's public key, and derives the
    /// shared AEAD key via ECDH + HKDF-SHA384.
    pub fn derive(local: EphemeralKeyPair, remote_public: &PublicKey) -> Result<AeadSession> {
        let shared = local.secret.diffie_hellman(remote_public);

        let hk = Hkdf::<Sha384>::new(None, shared.raw_secret_bytes());
        let mut okm = [0u8; 32];
        hk.expand(b"ipc-channel-aead-key", &mut okm)
            .map_err(|_| Error::Aead)?;

        Ok(AeadSession {
            cipher: ChaCha20Poly1305::new((&okm).into()),
        })
    }
}

impl Session for AeadSession {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| Error::Aead)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_LEN {
            return Err(Error::Aead);
        }

        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        self.cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| Error::Aead)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::parse_remote_public_key;

    fn established_pair() -> (AeadSession, AeadSession) {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();

        let a_pub = parse_remote_public_key(&a.public_key_bytes()).unwrap();
        let b_pub = parse_remote_public_key(&b.public_key_bytes()).unwrap();

        let session_a = AeadSession::derive(a, &b_pub).unwrap();
        let session_b = AeadSession::derive(b, &a_pub).unwrap();
        (session_a, session_b)
    }

    #[test]
    fn both_sides_derive_the_same_key() {
        let (alice, bob) = established_pair();

        let sealed = alice.seal(b"hello bob").unwrap();
        let opened = bob.open(&sealed).unwrap();
        assert_eq!(opened, b"hello bob");
    }

    #[test]
    fn each_seal_uses_a_fresh_nonce() {
        let (alice, _bob) = established_pair();
        let a = alice.seal(b"same plaintext").unwrap();
        let b = alice.seal(b"same plaintext").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tampered_ciphertext_fails_to_open() {
        let (alice, bob) = established_pair();
        let mut sealed = alice.seal(b"integrity matters").unwrap();
        *sealed.last_mut().unwrap() ^= 0xff;

        assert!(bob.open(&sealed).is_err());
    }
}
