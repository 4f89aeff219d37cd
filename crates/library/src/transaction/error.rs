//! Error types for the [`transaction`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A transaction error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transaction operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Nothing to move or copy.
    #[display("entry not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Entry names are single path segments.
    #[display("invalid entry name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Destination and source contain one another on the same backend.
    #[display("destination overlaps its source: {}", _0.display())]
    Overlap(#[error(not(source))] PathBuf),
    /// A storage backend operation failed partway. The destination may be
    /// partially written.
    #[display("storage operation failed")]
    Storage,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
