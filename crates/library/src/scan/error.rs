//! Error types for the [`scan`](super) module.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A scan error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for scan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a scan failure.
///
/// Only [`Storage`](ErrorKind::Storage) failures on the library root end a
/// scan; anything wrong with a single package is reported as a skip.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Listing or reading from the storage backend failed.
    #[display("could not read library storage")]
    Storage,
    /// `song.ini` has no `[song]` section with a song name.
    #[display("no chart metadata in {}", _0.display())]
    Metadata(#[error(not(source))] PathBuf),
    /// A `.sng` file isn't a readable container.
    #[display("unreadable package {}", _0.display())]
    Container(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}
