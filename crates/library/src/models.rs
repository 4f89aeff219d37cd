/// What a chart is, as far as the library is concerned: who made the song,
/// what it's called and who charted it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChartMeta {
    pub artist: String,
    /// Song title.
    pub name: String,
    pub charter: String,
}
impl ChartMeta {
    pub fn new(artist: impl Into<String>, name: impl Into<String>, charter: impl Into<String>) -> Self {
        Self { artist: artist.into(), name: name.into(), charter: charter.into() }
    }

    /// Reads `artist`, `name` and `charter` (falling back to the older
    /// `frets` key) from `song.ini` style pairs. Keys match
    /// case-insensitively; the first occurrence wins. Returns `None` without
    /// a song name.
    pub(crate) fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<Self> {
        let (mut artist, mut name, mut charter, mut frets) = (None, None, None, None);
        for (key, value) in pairs {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let slot = match key.trim().to_ascii_lowercase().as_str() {
                "artist" => &mut artist,
                "name" => &mut name,
                "charter" => &mut charter,
                "frets" => &mut frets,
                _ => continue,
            };
            slot.get_or_insert_with(|| value.to_string());
        }
        Some(Self {
            name: name?,
            artist: artist.unwrap_or_default(),
            charter: charter.or(frets).unwrap_or_default(),
        })
    }

    /// Pairs to override container metadata with when synthesizing a
    /// `song.ini`. Blank fields leave the container's value alone.
    pub(crate) fn song_ini_overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        [("name", self.name.as_str()), ("artist", self.artist.as_str()), ("charter", self.charter.as_str())]
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pairs() {
        let pairs = [("Name", "Song"), ("artist", " Band "), ("frets", "Old"), ("charter", "New"), ("name", "Other")];
        assert_eq!(ChartMeta::from_pairs(pairs), Some(ChartMeta::new("Band", "Song", "New")));
    }

    #[test]
    fn test_from_pairs_fallbacks() {
        assert_eq!(ChartMeta::from_pairs([("name", "Song"), ("frets", "Old")]), Some(ChartMeta::new("", "Song", "Old")));
        assert_eq!(ChartMeta::from_pairs([("artist", "Band"), ("name", "  ")]), None);
    }

    #[test]
    fn test_blank_fields_do_not_override() {
        let meta = ChartMeta::new("Band", "Song", "");
        let overrides: Vec<_> = meta.song_ini_overrides().collect();
        assert_eq!(overrides, [("name", "Song"), ("artist", "Band")]);
    }
}
