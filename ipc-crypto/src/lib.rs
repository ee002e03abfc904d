//! Key agreement and AEAD wrapping for the IPC encryption handshake (§4.2
//! encryption leg and §4.3). Treats the specific curve and AEAD primitive as
//! this crate's own concern; callers only see ephemeral key pairs, a 97-byte
//! public key wire format, and a `Session` that seals/opens frame bodies.

mod error;
mod keys;
mod session;

pub use error::{Error, Result};
pub use keys::{parse_remote_public_key, EphemeralKeyPair, PUBLIC_KEY_LEN};
pub use p384::PublicKey;
pub use session::{AeadSession, Session, AEAD_OVERHEAD};
