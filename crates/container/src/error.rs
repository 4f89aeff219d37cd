//! Container Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io;

/// A container decoding error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// Kinds are [`Clone`]: once a decoder has failed, every later call on it
/// reports the same kind again.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Header, metadata or index is malformed. Don't retry with the same input.
    #[display("malformed container manifest: {_0}")]
    Manifest(#[error(not(source))] String),
    /// The stream ended before an entry's declared length was delivered.
    #[display("entry {name} truncated: expected {expected} bytes, received {received}")]
    Framing { name: String, expected: u64, received: u64 },
    /// The underlying byte stream failed.
    #[display("container stream failed: {_0}")]
    Transport(#[error(not(source))] io::ErrorKind),
}

impl ErrorKind {
    pub(crate) fn manifest(message: impl Into<String>) -> Self {
        Self::Manifest(message.into())
    }

    /// Returns `true` if retrying might succeed (with a fresh stream).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let framing = ErrorKind::Framing { name: "song.ogg".to_string(), expected: 10, received: 4 };
        assert_eq!(framing.to_string(), "entry song.ogg truncated: expected 10 bytes, received 4");
        assert_eq!(ErrorKind::manifest("bad magic").to_string(), "malformed container manifest: bad magic");
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorKind::Transport(io::ErrorKind::ConnectionReset).is_retryable());
        assert!(!ErrorKind::manifest("bad magic").is_retryable());
    }
}
