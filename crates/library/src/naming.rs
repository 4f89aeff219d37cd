//! Package naming for library folders.
//!
//! Converts [`ChartMeta`] into a single, deterministic folder name using a
//! user-configured [upon] template. The template syntax follows upon's
//! Mustache-like conventions (`{{ variable }}`, `{{ value|formatter }}`),
//! extended with two helpers:
//!
//! - **`slug`** converts strings to URL-safe slugs, stripping quotation marks
//!   first to avoid artifacts like leading/trailing hyphens.
//! - **`truncate`** truncates strings to a maximum byte length at a character
//!   boundary, usable as either `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable  | Type     | Description              |
//! |-----------|----------|--------------------------|
//! | `artist`  | `String` | Song artist              |
//! | `name`    | `String` | Song title               |
//! | `charter` | `String` | Who made the chart       |
//!
//! # Example
//!
//! ```
//! use chartshelf_library::{ChartMeta, NameGenerator};
//!
//! let generator: NameGenerator = "{{ artist|slug }}_{{ name|slug }}".parse().unwrap();
//! let meta = ChartMeta::new("Band", "Song: Reprise", "Someone");
//! assert_eq!(generator.generate(&meta).unwrap(), "band_song-reprise");
//! ```

use crate::error::{Error, ErrorKind, Result};
use crate::models::ChartMeta;
use chartshelf_storage::is_reserved_device_name;
use exn::ResultExt;
use std::fmt;
use std::str::FromStr;
use tracing::instrument;
use upon::{Engine, Template};

/// Template used when none is configured.
pub const DEFAULT_TEMPLATE: &str = "{{ artist }} - {{ name }} ({{ charter }})";
/// Longest folder name generated, in bytes.
pub const MAX_NAME_LEN: usize = 100;

const RESERVED_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Generates library folder names from [`ChartMeta`] and a template string.
///
/// Constructed via [`FromStr`], which compiles the template eagerly so that
/// syntax errors surface at creation time rather than at render time.
pub struct NameGenerator {
    engine: Engine<'static>,
    template: Template<'static>,
    source: String,
}
impl FromStr for NameGenerator {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let template = engine.compile(s.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self { engine, template, source: s.to_string() })
    }
}
impl fmt::Debug for NameGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameGenerator").field("template", &self.source).finish()
    }
}
impl NameGenerator {
    /// The template this generator was compiled from.
    pub fn template(&self) -> &str {
        &self.source
    }

    /// Renders the template for `meta` and sanitizes the result into a
    /// single path segment.
    ///
    /// # Errors
    ///
    /// [`Template`](ErrorKind::Template) if rendering fails,
    /// [`InvalidName`](ErrorKind::InvalidName) if nothing usable is left
    /// after sanitizing.
    #[instrument(level = "debug", skip_all, fields(name = %meta.name))]
    pub fn generate(&self, meta: &ChartMeta) -> Result<String> {
        let rendered = self
            .template
            .render(&self.engine, upon::value! { artist: &meta.artist, name: &meta.name, charter: &meta.charter })
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        sanitize(&rendered).ok_or_else(|| Error::from(ErrorKind::InvalidName(rendered)))
    }
}

/// Turns arbitrary text into a folder name that's valid on every platform
/// the game runs on. `None` if nothing is left.
fn sanitize(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !c.is_control() && !RESERVED_CHARS.contains(c)).collect();
    let trimmed = trim(&cleaned);
    let mut name = trim(&trimmed[..trimmed.floor_char_boundary(MAX_NAME_LEN)]).to_string();
    if name.is_empty() {
        return None;
    }
    if is_reserved_device_name(&name) {
        name.push('_');
    }
    Some(name)
}

/// Windows drops trailing dots and spaces, so names must not end in them.
/// Leading dots would hide the package, and are reserved for bookkeeping
/// entries in the backup area.
fn trim(s: &str) -> &str {
    s.trim_matches(|c: char| c == '.' || c.is_whitespace())
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"hello"` becoming `-hello-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                // Various quotation marks: '"''""„"`«»
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn generate(template: &str, meta: &ChartMeta) -> Result<String> {
        template.parse::<NameGenerator>()?.generate(meta)
    }

    #[test]
    fn test_default_template() {
        let meta = ChartMeta::new("Dragonforce", "Through the Fire and Flames", "Harmonix");
        assert_eq!(
            generate(DEFAULT_TEMPLATE, &meta).unwrap(),
            "Dragonforce - Through the Fire and Flames (Harmonix)"
        );
    }

    #[test]
    fn test_invalid_template_fails_at_parse() {
        assert!("{{ artist".parse::<NameGenerator>().is_err());
    }

    #[test]
    fn test_slug_strips_quotes() {
        let meta = ChartMeta::new("Band", "\"Hello\" World's 'Test'", "");
        assert_eq!(generate("{{ name|slug }}", &meta).unwrap(), "hello-worlds-test");
    }

    #[rstest]
    #[case("{{ truncate(name, 10)|slug }}")]
    #[case("{{ name|truncate: 10|slug }}")]
    fn test_truncate_function(#[case] template: &str) {
        let meta = ChartMeta::new("", "A Very Long Title Indeed", "");
        assert_eq!(generate(template, &meta).unwrap(), "a-very-lon");
    }

    #[rstest]
    #[case("AC/DC - T.N.T. (Someone)", "ACDC - T.N.T. (Someone)")]
    #[case("What? <Live>: \"Encore\" | *", "What Live Encore")]
    #[case("  Trailing dots...  ", "Trailing dots")]
    #[case("...And Justice for All", "And Justice for All")]
    #[case("Tab\tand\nnewline", "Tabandnewline")]
    #[case("CON", "CON_")]
    #[case("nul.txt", "nul.txt_")]
    #[case("Console", "Console")]
    fn test_sanitize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize(raw).as_deref(), Some(expected));
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("???")]
    #[case("..")]
    fn test_sanitize_rejects_empty(#[case] raw: &str) {
        assert_eq!(sanitize(raw), None);
    }

    #[test]
    fn test_truncates_at_char_boundary() {
        let long = "é".repeat(80);
        let name = sanitize(&long).unwrap();
        assert!(name.len() <= MAX_NAME_LEN);
        assert_eq!(name.chars().count(), 50);
    }

    #[test]
    fn test_truncation_retrims() {
        let raw = format!("{}   tail", "a".repeat(98));
        assert_eq!(sanitize(&raw).unwrap(), "a".repeat(98));
    }

    #[test]
    fn test_empty_render_is_invalid_name() {
        let err = generate("{{ charter }}", &ChartMeta::new("Band", "Song", "")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidName(_)));
    }
}
