//! Streaming decoder for SNG chart package containers.
//!
//! A container is a single binary stream: a header with a XOR mask, a list
//! of metadata key/value pairs, an index of named entries and finally the
//! masked entry bytes. The [`Decoder`] demultiplexes that stream into
//! individual [`DecodedEntry`] readers without ever holding a whole entry
//! in memory, so multi-megabyte audio stems can be piped straight from the
//! network into storage.
//!
//! The `encode` feature adds `encode::ContainerBuilder` for tests in
//! dependent crates.

mod decoder;
#[cfg(any(test, feature = "encode"))]
pub mod encode;
pub mod error;
mod manifest;
mod song_ini;

pub use crate::decoder::{DecodedEntry, Decoder};
pub use crate::manifest::{MAX_ENTRIES, MAX_METADATA_PAIRS, MAX_SECTION_LEN, Manifest, ManifestEntry};
pub use crate::song_ini::{SONG_INI, VirtualEntry, song_ini};
