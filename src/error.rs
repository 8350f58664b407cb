//! Error types for the NoiseSocket protocol.

use std::sync::Arc;

use thiserror::Error;

/// Result type alias for NoiseSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on a NoiseSocket connection.
///
/// Errors on an established direction are sticky: once a direction has
/// failed, every subsequent operation on it returns a clone of the same
/// error. `Clone` is therefore part of the contract, and wrapped I/O
/// errors are reference-counted to support it.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// The remote static key handed to the dialer has the wrong length
    #[error("invalid peer static key length: {0} (expected 32)")]
    InvalidKey(usize),

    /// A composed message does not fit the u16 record framing
    #[error("message exceeds maximum record size")]
    MessageTooLarge,

    /// The peer offered no handshake protocol we support
    #[error("no mutually supported handshake protocol")]
    UnsupportedProtocol,

    /// The Noise handshake was rejected
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// AEAD tag verification failed on an incoming record
    #[error("record authentication failed")]
    AuthenticationFailure,

    /// The stream ended in the middle of a record
    #[error("stream truncated inside a record")]
    Truncated,

    /// A record's declared lengths are inconsistent with its contents
    #[error("invalid record framing: {0}")]
    InvalidFraming(&'static str),

    /// Internal state violation; indicates a bug, not a peer fault
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Underlying stream I/O error
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Create a new handshake error.
    pub fn handshake(msg: impl Into<String>) -> Self {
        Error::HandshakeFailed(msg.into())
    }

    /// Check if this error indicates an authentication failure.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::AuthenticationFailure)
    }

    /// Check if this error was produced during handshake negotiation.
    pub fn is_handshake_failure(&self) -> bool {
        matches!(
            self,
            Error::HandshakeFailed(_) | Error::UnsupportedProtocol | Error::InvalidKey(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<snow::Error> for Error {
    fn from(err: snow::Error) -> Self {
        Error::HandshakeFailed(err.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(inner) => inner.kind(),
            Error::Truncated => std::io::ErrorKind::UnexpectedEof,
            Error::AuthenticationFailure | Error::InvalidFraming(_) => {
                std::io::ErrorKind::InvalidData
            }
            _ => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AuthenticationFailure;
        assert_eq!(err.to_string(), "record authentication failed");

        let err = Error::InvalidKey(31);
        assert_eq!(
            err.to_string(),
            "invalid peer static key length: 31 (expected 32)"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::AuthenticationFailure.is_auth_failure());
        assert!(!Error::Truncated.is_auth_failure());

        assert!(Error::handshake("nope").is_handshake_failure());
        assert!(Error::UnsupportedProtocol.is_handshake_failure());
        assert!(!Error::Truncated.is_handshake_failure());
    }

    #[test]
    fn test_io_error_is_cloneable() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline").into();
        let copy = err.clone();
        assert_eq!(err.to_string(), copy.to_string());
    }
}
