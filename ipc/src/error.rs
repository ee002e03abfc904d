use crate::types::Status;
use thiserror::Error;

/// The main error type for this library. Display strings are part of the
/// public contract (§7, §8) — several are asserted verbatim by callers and
/// by the test scenarios in spec §8, so change them only if the contract
/// changes too.
#[derive(Error, Debug)]
pub enum Error {
    #[error("ipcName cannot be an empty string")]
    EmptyName,

    #[error("message type 0 is reserved")]
    ReservedMessageType,

    #[error("message exceeds maximum message length")]
    MessageTooLarge,

    #[error("cannot write under current status: {0}")]
    CannotWriteUnderStatus(Status),

    #[error("the received channel has been closed")]
    ChannelClosed,

    #[error("client has a different VERSION number")]
    VersionMismatch,

    #[error("client is enforcing encryption")]
    EncryptionEnforcedByPeer,

    #[error("server tried to connect without encryption")]
    EncryptionRefusedByPeer,

    #[error("timed out trying to connect")]
    TimedOutConnecting,

    #[error("timed out trying to re-connect")]
    TimedOutReconnecting,

    #[error(transparent)]
    Codec(#[from] ipc_codec::Error),

    #[error(transparent)]
    Crypto(#[from] ipc_crypto::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Alias Result type for the library.
pub type Result<T> = std::result::Result<T, Error>;
