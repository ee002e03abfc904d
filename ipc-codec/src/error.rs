use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("frame body shorter than the 4-byte type tag, got {0} bytes")]
    ShortBody(usize),

    #[error("frame length {0} exceeds the configured maximum of {1}")]
    FrameTooLarge(u32, u32),
}

/// Alias Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;
