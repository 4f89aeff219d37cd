//! Container manifest: header constants, metadata and the entry index.
//!
//! Both sections are small and length-prefixed, so they are read into
//! memory whole (bounded by [`MAX_SECTION_LEN`]) and parsed from a slice.

use crate::error::{ErrorKind, Result};
use std::collections::HashSet;

pub const MAGIC: &[u8; 6] = b"SNGPKG";
pub const VERSION: u32 = 1;
pub const MASK_LEN: usize = 16;
/// Magic, version and mask.
pub(crate) const HEADER_LEN: u64 = 6 + 4 + MASK_LEN as u64;
/// Upper bound for the metadata and index sections, in bytes.
pub const MAX_SECTION_LEN: u64 = 1024 * 1024;
pub const MAX_ENTRIES: u64 = 4096;
pub const MAX_METADATA_PAIRS: u64 = 4096;

/// One file inside a container. `offset` is absolute from the start of the
/// stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub length: u64,
    pub offset: u64,
}

/// Everything a container declares before its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub version: u32,
    /// Key/value pairs, in stream order.
    pub metadata: Vec<(String, String)>,
    /// Entries, in stream (and offset) order.
    pub entries: Vec<ManifestEntry>,
    /// Absolute offset of the first payload byte.
    pub payload_start: u64,
    pub payload_len: u64,
}
impl Manifest {
    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Checks that entries sit inside the payload section, in offset order,
    /// without overlapping.
    pub(crate) fn validate_layout(&self) -> Result<()> {
        let payload_end = self
            .payload_start
            .checked_add(self.payload_len)
            .ok_or_else(|| ErrorKind::manifest("payload section length overflows"))?;
        let mut cursor = self.payload_start;
        for entry in &self.entries {
            if entry.offset < cursor {
                exn::bail!(ErrorKind::manifest(format!("entry {} is out of order or overlaps", entry.name)));
            }
            let end = entry
                .offset
                .checked_add(entry.length)
                .filter(|end| *end <= payload_end)
                .ok_or_else(|| ErrorKind::manifest(format!("entry {} extends past the payload", entry.name)))?;
            cursor = end;
        }
        Ok(())
    }
}

/// Read-only cursor over one section's bytes.
struct Section<'a> {
    name: &'static str,
    bytes: &'a [u8],
}
impl<'a> Section<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.bytes.len() < len {
            exn::bail!(ErrorKind::manifest(format!("{} section is shorter than its contents", self.name)));
        }
        let (head, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    /// Signed length prefix, as used by metadata pairs.
    fn len_i32(&mut self) -> Result<usize> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        let len = i32::from_le_bytes(buf);
        usize::try_from(len)
            .map_err(|_| ErrorKind::manifest(format!("negative length {len} in {} section", self.name)).into())
    }

    fn string(&mut self, len: usize) -> Result<String> {
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ErrorKind::manifest(format!("non UTF-8 string in {} section", self.name)).into())
    }

    /// The declared count, rejected early if it exceeds `max`.
    fn count(&mut self, max: u64) -> Result<usize> {
        let count = self.u64()?;
        if count > max {
            exn::bail!(ErrorKind::manifest(format!("{} section declares {count} items (max {max})", self.name)));
        }
        Ok(count as usize)
    }

    fn finish(self) -> Result<()> {
        if !self.bytes.is_empty() {
            exn::bail!(ErrorKind::manifest(format!("{} section length does not match its contents", self.name)));
        }
        Ok(())
    }
}

pub(crate) fn parse_metadata(bytes: &[u8]) -> Result<Vec<(String, String)>> {
    let mut section = Section { name: "metadata", bytes };
    let count = section.count(MAX_METADATA_PAIRS)?;
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let key_len = section.len_i32()?;
        let key = section.string(key_len)?;
        let value_len = section.len_i32()?;
        let value = section.string(value_len)?;
        pairs.push((key, value));
    }
    section.finish()?;
    Ok(pairs)
}

pub(crate) fn parse_index(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    let mut section = Section { name: "index", bytes };
    let count = section.count(MAX_ENTRIES)?;
    let mut entries = Vec::with_capacity(count);
    let mut seen = HashSet::with_capacity(count);
    for _ in 0..count {
        let name_len = section.u8()? as usize;
        let name = section.string(name_len)?;
        let length = section.u64()?;
        let offset = section.u64()?;
        if chartshelf_storage::validate_name(&name).is_err() {
            exn::bail!(ErrorKind::manifest(format!("invalid entry name {name:?}")));
        }
        if !seen.insert(name.clone()) {
            exn::bail!(ErrorKind::manifest(format!("duplicate entry name {name:?}")));
        }
        entries.push(ManifestEntry { name, length, offset });
    }
    section.finish()?;
    Ok(entries)
}

/// XORs payload bytes in place. `start` is the position of `buf[0]` within
/// its entry. The operation is its own inverse.
pub(crate) fn apply_mask(mask: &[u8; MASK_LEN], start: u64, buf: &mut [u8]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        let index = start + i as u64;
        *byte ^= mask[(index % MASK_LEN as u64) as usize] ^ (index & 0xFF) as u8;
    }
}
