//! Container builder for tests.

use crate::manifest::{self, HEADER_LEN, MAGIC, MASK_LEN, VERSION};

/// Writes well-formed (or, with [`version`](Self::version), deliberately
/// unsupported) containers in memory. Payload bytes are laid out in entry
/// order, each preceded by the configured padding.
#[derive(Debug, Clone)]
pub struct ContainerBuilder {
    version: u32,
    mask: [u8; MASK_LEN],
    metadata: Vec<(String, String)>,
    entries: Vec<(String, Vec<u8>)>,
    padding: u64,
}
impl Default for ContainerBuilder {
    fn default() -> Self {
        Self {
            version: VERSION,
            mask: std::array::from_fn(|i| 0xA5 ^ (i as u8).wrapping_mul(29)),
            metadata: Vec::new(),
            entries: Vec::new(),
            padding: 0,
        }
    }
}
impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn mask(mut self, mask: [u8; MASK_LEN]) -> Self {
        self.mask = mask;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push((key.into(), value.into()));
        self
    }

    /// Panics at [`build`](Self::build) time if the name is longer than 255
    /// bytes.
    pub fn entry(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.entries.push((name.into(), contents.into()));
        self
    }

    /// Filler bytes written before every entry's payload.
    pub fn padding(mut self, bytes: u64) -> Self {
        self.padding = bytes;
        self
    }

    /// Entries as added, unmasked.
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        self.entries.clone()
    }

    pub fn build(&self) -> Vec<u8> {
        let mut metadata = (self.metadata.len() as u64).to_le_bytes().to_vec();
        for (key, value) in &self.metadata {
            metadata.extend((key.len() as i32).to_le_bytes());
            metadata.extend(key.as_bytes());
            metadata.extend((value.len() as i32).to_le_bytes());
            metadata.extend(value.as_bytes());
        }

        let index_len: u64 = 8 + self.entries.iter().map(|(name, _)| 1 + name.len() as u64 + 16).sum::<u64>();
        let payload_start = HEADER_LEN + 8 + metadata.len() as u64 + 8 + index_len + 8;

        let mut index = (self.entries.len() as u64).to_le_bytes().to_vec();
        let mut payload = Vec::new();
        for (name, contents) in &self.entries {
            let Ok(name_len) = u8::try_from(name.len()) else {
                panic!("ContainerBuilder: entry name too long: {name}");
            };
            payload.resize(payload.len() + self.padding as usize, 0xEE);
            let offset = payload_start + payload.len() as u64;
            index.push(name_len);
            index.extend(name.as_bytes());
            index.extend((contents.len() as u64).to_le_bytes());
            index.extend(offset.to_le_bytes());

            let start = payload.len();
            payload.extend(contents);
            manifest::apply_mask(&self.mask, 0, &mut payload[start..]);
        }

        let mut bytes = Vec::with_capacity(payload_start as usize + payload.len());
        bytes.extend(MAGIC);
        bytes.extend(self.version.to_le_bytes());
        bytes.extend(self.mask);
        bytes.extend((metadata.len() as u64).to_le_bytes());
        bytes.extend(metadata);
        bytes.extend((index.len() as u64).to_le_bytes());
        bytes.extend(index);
        bytes.extend((payload.len() as u64).to_le_bytes());
        bytes.extend(payload);
        bytes
    }
}
