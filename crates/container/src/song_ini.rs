//! `song.ini` synthesis from container metadata.

/// File name the game looks for in every chart folder.
pub const SONG_INI: &str = "song.ini";

/// An entry that doesn't come from the stream; appended after the real
/// entries by [`Decoder::with_virtual_entry`](crate::Decoder::with_virtual_entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEntry {
    pub name: String,
    pub contents: Vec<u8>,
}
impl VirtualEntry {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), contents: contents.into() }
    }
}

/// Builds a `song.ini` from container metadata merged with `overrides`.
///
/// Metadata keeps its stream order. An override replaces the value of a key
/// that matches case-insensitively, or is appended after the metadata.
/// Line breaks inside values are flattened to spaces.
///
/// ```
/// use chartshelf_container::song_ini;
///
/// let metadata = vec![("name".to_string(), "Song".to_string()), ("delay".to_string(), "0".to_string())];
/// let entry = song_ini(&metadata, [("Name", "Better Title"), ("charter", "Me")]);
/// assert_eq!(entry.name, "song.ini");
/// assert_eq!(entry.contents, b"[song]\nname = Better Title\ndelay = 0\ncharter = Me\n");
/// ```
pub fn song_ini<'a>(metadata: &[(String, String)], overrides: impl IntoIterator<Item = (&'a str, &'a str)>) -> VirtualEntry {
    let mut pairs: Vec<(String, String)> = metadata.to_vec();
    for (key, value) in overrides {
        match pairs.iter_mut().find(|(existing, _)| existing.eq_ignore_ascii_case(key)) {
            Some((_, existing)) => *existing = value.to_string(),
            None => pairs.push((key.to_string(), value.to_string())),
        }
    }

    let mut contents = String::from("[song]\n");
    for (key, value) in &pairs {
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.replace(['\r', '\n'], " ");
        contents.push_str(&format!("{key} = {}\n", value.trim()));
    }
    VirtualEntry::new(SONG_INI, contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_metadata() {
        let entry = song_ini(&[], []);
        assert_eq!(entry.contents, b"[song]\n");
    }

    #[test]
    fn test_values_are_flattened() {
        let metadata = vec![("loading_phrase".to_string(), "line one\r\nline two".to_string())];
        let entry = song_ini(&metadata, []);
        assert_eq!(String::from_utf8(entry.contents).unwrap(), "[song]\nloading_phrase = line one  line two\n");
    }

    #[test]
    fn test_blank_keys_are_dropped() {
        let metadata = vec![(" ".to_string(), "ghost".to_string()), ("artist".to_string(), "Band".to_string())];
        let entry = song_ini(&metadata, []);
        assert_eq!(entry.contents, b"[song]\nartist = Band\n");
    }
}
