use std::io;

use thiserror::Error;

pub type AgeResult<T> = Result<T, AgeError>;

#[derive(Debug, Error)]
pub enum AgeError {
    /// Malformed header syntax: bad version line, truncated footer, bad base64.
    #[error("header parse error: {0}")]
    Parse(String),

    /// A stanza type no recipient algorithm handles. Skipped while unlocking.
    #[error("unknown recipient type: {0}")]
    UnknownRecipient(String),

    /// Every (stanza, identity) pair was tried and none yielded the file key.
    #[error("no identity matched any of the recipients")]
    NoIdentity,

    /// The header MAC did not verify under the recovered file key.
    #[error("header authentication failed")]
    AuthenticationFailed,

    /// A payload chunk failed AEAD verification, the payload ended before its
    /// final chunk, or data followed the final chunk.
    #[error("payload corrupted at chunk {chunk}")]
    StreamCorruption { chunk: u128 },

    /// The file ended before the payload nonce.
    #[error("file truncated before the payload")]
    Truncated,

    #[error("invalid parameter: {0}")]
    Validation(String),

    #[error("stream nonce counter exhausted")]
    NonceOverflow,

    /// A primitive failed in a way that is not a key mismatch.
    #[error("cryptographic failure: {0}")]
    Crypto(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl AgeError {
    /// Wrap into an `io::Error` so stream adapters can surface it through
    /// `Read`/`Write` while keeping the original variant reachable.
    pub fn into_io(self) -> io::Error {
        match self {
            AgeError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }

    /// Recover the typed error from an `io::Error` produced by [`AgeError::into_io`].
    pub fn from_io(err: io::Error) -> AgeError {
        let is_age = err
            .get_ref()
            .map(|inner| inner.is::<AgeError>())
            .unwrap_or(false);
        if !is_age {
            return AgeError::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<AgeError>()) {
            Some(Ok(age)) => *age,
            Some(Err(inner)) => AgeError::Io(io::Error::new(io::ErrorKind::InvalidData, inner)),
            None => AgeError::Crypto("empty I/O error".into()),
        }
    }
}
