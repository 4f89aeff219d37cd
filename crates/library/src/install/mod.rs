//! Installing chart packages into the library.
//!
//! An install runs through a fixed sequence of [`InstallState`]s:
//!
//! ```text
//! Fetching → Decoding → Staged → Committing → Done
//!     └──────────┴─────────┴──────────┴──→ Aborted
//! ```
//!
//! Entries are decoded straight from the incoming stream into a fresh
//! directory in the staging area. Only once the whole container decoded
//! cleanly is that directory moved into the library, after backing up any
//! package it replaces. Whatever goes wrong, the library ends up exactly as
//! it was before the install started.

mod cancellable;
pub mod error;
mod pipeline;

pub use self::pipeline::{download, install};
use crate::context::Location;
use crate::models::ChartMeta;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// What to install, and how.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    /// Names the package and fills in the synthesized `song.ini`.
    pub meta: ChartMeta,
    /// Replace an installed package with the same name instead of failing.
    pub replace: bool,
    pub cancel: CancellationToken,
}
impl InstallRequest {
    pub fn new(meta: ChartMeta) -> Self {
        Self { meta, replace: false, cancel: CancellationToken::new() }
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A package that made it into the library.
#[derive(Debug, Clone)]
pub struct Installed {
    /// The library location the package was committed to.
    pub location: Location,
    /// Folder name of the package inside `location`.
    pub name: String,
    /// Entry names, in the order they were decoded.
    pub entries: Vec<String>,
    /// An existing package was replaced.
    pub replaced: bool,
}
impl Installed {
    pub fn path(&self) -> PathBuf {
        self.location.path(&self.name)
    }
}

/// Where an install is at. Logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum InstallState {
    #[display("fetching")]
    Fetching,
    #[display("decoding")]
    Decoding,
    #[display("staged")]
    Staged,
    #[display("committing")]
    Committing,
    #[display("done")]
    Done,
    #[display("aborted")]
    Aborted,
}
