use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("public key received isn't valid length 97, got: {0}")]
    InvalidPublicKeyLength(usize),

    #[error("received public key does not lie on the curve")]
    InvalidPublicKey,

    #[error("AEAD seal/open failed")]
    Aead,
}

/// Alias Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
