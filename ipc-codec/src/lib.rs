//! Frame codec for the IPC wire protocol.
//!
//! Wire framing is a big-endian 32-bit length followed by that many bytes of
//! frame body; the body itself begins with a big-endian 32-bit type tag
//! followed by the payload. See the crate that builds the handshake and
//! actor runtime on top of this for the rest of the protocol.

mod error;
mod frame;

pub use error::{Error, Result};
pub use frame::{decode_body, encode_body, read_frame, write_frame, CONTROL_TYPE, TYPE_TAG_LEN};
