//! Just enough of an INI reader for `song.ini`.

/// Key/value pairs from the `[song]` section, in file order.
///
/// Section names match case-insensitively. Blank lines, `;` and `#`
/// comments and lines without `=` are ignored. A leading byte order mark is
/// dropped.
pub(crate) fn song_section(text: &str) -> Vec<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut in_song = false;
    let mut pairs = Vec::new();
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(section) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            in_song = section.trim().eq_ignore_ascii_case("song");
            continue;
        }
        if in_song && let Some((key, value)) = line.split_once('=') {
            pairs.push((key.trim(), value.trim()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_song_section() {
        let text = "\u{feff}; exported\n[Song]\r\nname = Song = Title\r\nartist=Band\n# charter = nope\n\n[other]\nname = Other\n";
        assert_eq!(song_section(text), vec![("name", "Song = Title"), ("artist", "Band")]);
    }

    #[test]
    fn test_pairs_outside_song_are_ignored() {
        assert!(song_section("name = Loose\n[notes]\nname = Nope").is_empty());
    }
}
