//! Errors raised while encoding or decoding XDR data.
//!
//! None of these are ever retried: a buffer that failed to encode or decode
//! is discarded together with the call it belonged to.

/// XDR codec result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single XDR encode or decode step.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer bytes remain than the value being decoded requires.
    #[error("truncated XDR input")]
    TruncatedInput,

    /// Decoding finished with unconsumed bytes left in the buffer.
    #[error("{remaining} trailing bytes after XDR message")]
    TrailingData { remaining: usize },

    /// A length does not fit the 32-bit XDR length field.
    #[error("length {len} is not representable in XDR")]
    InvalidLength { len: usize },

    /// String data is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    EncodingError,

    /// A discriminant, continuation flag or enum value is out of range.
    #[error("corrupt XDR data: {0}")]
    Corrupt(String),

    /// The underlying writer failed.
    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TruncatedInput,
            _ => Error::Io(err),
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Error::TruncatedInput, Error::TruncatedInput) => true,
            (Error::TrailingData { remaining: a }, Error::TrailingData { remaining: b }) => a == b,
            (Error::InvalidLength { len: a }, Error::InvalidLength { len: b }) => a == b,
            (Error::EncodingError, Error::EncodingError) => true,
            (Error::Corrupt(a), Error::Corrupt(b)) => a == b,
            (Error::Io(a), Error::Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}
