//! Error types for the [`install`](super) module.
//!
//! Uses [`exn`] for automatic location tracking and error tree construction.

use derive_more::{Display, Error};

/// An install error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for install operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The step of an install that touched storage when it failed.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Writing decoded entries into the staging area.
    #[display("staging")]
    Staging,
    /// Backing up the existing package or moving the new one into the
    /// library.
    #[display("committing")]
    Committing,
    /// Retiring the backup of a replaced package after the new one was
    /// committed. The new package is in the library, but the next
    /// reconciliation puts the old one back.
    #[display("discarding the backup")]
    Discarding,
}

/// Classifies why an install was aborted.
///
/// Whatever the kind, the library is left as it was before the install
/// started, or reconciliation brings it back there: a [`Stage::Committing`]
/// failure whose revert also failed, or a [`Stage::Discarding`] failure,
/// leaves a complete backup for [`reconcile`](crate::reconcile::reconcile)
/// to restore.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The byte stream could not be fetched or broke off mid-read.
    #[display("could not fetch the package")]
    Transport,
    /// The container header, metadata or index is malformed.
    #[display("malformed package manifest")]
    Manifest,
    /// The stream ended inside the named entry.
    #[display("package entry {_0} is truncated")]
    Framing(#[error(not(source))] String),
    /// Storage failed while staging or committing.
    #[display("storage failed while {_0}")]
    Storage(#[error(not(source))] Stage),
    /// A package with this name exists and replacing wasn't requested.
    #[display("{_0:?} is already installed")]
    AlreadyInstalled(#[error(not(source))] String),
    #[display("install cancelled")]
    Cancelled,
    /// No usable package name could be generated from the chart metadata.
    #[display("could not name the package")]
    Naming,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport | Self::Storage(_))
    }
}
