use crate::models::ChartMeta;
use rslug::slugify;
use std::fmt;

/// Identity of a chart for "is this already installed?" lookups.
///
/// Each part is slugified so that case, punctuation and spacing
/// differences between sources don't matter. The digest is a BLAKE3 hash of
/// the three slugs and is what indexes are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Fingerprint {
    pub artist: String,
    pub title: String,
    pub charter: String,
    pub digest: String,
}
impl Fingerprint {
    pub fn new(meta: &ChartMeta) -> Self {
        let artist = slugify!(&meta.artist);
        let title = slugify!(&meta.name);
        let charter = slugify!(&meta.charter);
        let mut hasher = blake3::Hasher::new();
        for part in [&artist, &title, &charter] {
            hasher.update(part.as_bytes());
            hasher.update(&[0]);
        }
        let digest = hasher.finalize().to_hex().to_string();
        Self { artist, title, charter, digest }
    }
}
impl From<&ChartMeta> for Fingerprint {
    fn from(meta: &ChartMeta) -> Self {
        Self::new(meta)
    }
}
impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.artist, self.title, self.charter)
    }
}
