//! Path validation and security utilities.
//!
//! This module provides functions to validate storage paths and entry names
//! and prevent security issues like path traversal attacks.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Names that Windows refuses to create as files, regardless of extension.
const RESERVED_DEVICE_NAMES: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9", "LPT1", "LPT2",
    "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Validates a storage path for security and correctness.
/// Ensures that paths don't escape the storage root (no `..` traversal).
///
/// > **Note:** This does **not** normalize backslashes, non-UTF8 bytes, or
/// >           platform-specific weirdness. Null bytes are explicitly rejected.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use chartshelf_storage::validate_path;
/// // Valid paths
/// assert!(validate_path("Artist - Song (Charter)/notes.chart").is_ok());
/// assert!(validate_path("a/../song.ogg").is_ok()); // (never leaves the root)
/// // Invalid paths
/// assert!(validate_path("../etc/passwd").is_err());
/// assert!(validate_path("a/../../b").is_err()); // (leaves the root)
/// assert!(validate_path("a\0b").is_err());
/// // Paths get resolved
/// assert_eq!(
///     validate_path("wrong/../still-wrong/.././correct//./song.ini/").unwrap(),
///     Path::new("correct/song.ini")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.as_ref().to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a single entry name: exactly one plain path segment.
///
/// Unlike [`validate`], nothing is normalized: `a/b`, `.`, `..`, names with
/// either slash, NUL bytes and the empty string are all rejected as-is.
/// Names are case-sensitive and compared byte-for-byte.
///
/// ```
/// use chartshelf_storage::validate_name;
/// assert!(validate_name("notes.chart").is_ok());
/// assert!(validate_name("Artist - Song (Charter)").is_ok());
/// assert!(validate_name("a/b").is_err());
/// assert!(validate_name("..").is_err());
/// ```
pub fn validate_name(name: &str) -> Result<&str> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || name.trim().is_empty();
    if invalid {
        exn::bail!(ErrorKind::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Returns `true` if `name` (ignoring any extension) is a device name that
/// Windows reserves, such as `CON` or `lpt1.txt`.
pub fn is_reserved_device_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_DEVICE_NAMES.iter().any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate(Path::new("Songs/notes.chart")).unwrap(), Path::new("Songs/notes.chart"));
        assert_eq!(validate(Path::new("a/b/c/song.ogg")).unwrap(), Path::new("a/b/c/song.ogg"));
        assert_eq!(validate(Path::new("song.ini")).unwrap(), Path::new("song.ini"));
    }

    #[test]
    fn test_path_normalization() {
        assert_eq!(validate(Path::new("a//b//c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/./b/./c")).unwrap(), Path::new("a/b/c"));
        assert_eq!(validate(Path::new("a/b/..")).unwrap(), Path::new("a"));
    }

    #[test]
    fn test_traversal_attempts() {
        assert!(validate(Path::new("../etc/passwd")).is_err());
        assert!(validate(Path::new("a/../../b")).is_err());
        assert!(validate(Path::new("..")).is_err());
        assert!(validate(Path::new("../..")).is_err());
    }

    #[test]
    fn test_invalid_characters_and_empty() {
        assert!(validate(Path::new("a\0b")).is_err());
        assert!(validate(Path::new("")).is_err());
        assert!(validate(Path::new(".")).is_err());
        assert!(validate(Path::new("./.")).is_err());
        assert!(validate(Path::new("//")).is_err());
    }

    #[test]
    fn test_trailing_slashes() {
        assert_eq!(validate(Path::new("Songs/")).unwrap(), Path::new("Songs"));
        assert_eq!(validate(Path::new("Songs///")).unwrap(), Path::new("Songs"));
    }

    #[rstest]
    #[case("notes.chart", true)]
    #[case("Artist - Song (Charter)", true)]
    #[case(".hidden", true)]
    #[case("Song", true)]
    #[case("song", true)]
    #[case("", false)]
    #[case("   ", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("a/b", false)]
    #[case("a\\b", false)]
    #[case("a\0b", false)]
    fn test_validate_name(#[case] name: &str, #[case] valid: bool) {
        assert_eq!(validate_name(name).is_ok(), valid);
    }

    #[rstest]
    #[case("CON", true)]
    #[case("con", true)]
    #[case("lpt1.txt", true)]
    #[case("Console", false)]
    #[case("Artist - Song (Charter)", false)]
    fn test_reserved_device_names(#[case] name: &str, #[case] reserved: bool) {
        assert_eq!(is_reserved_device_name(name), reserved);
    }
}
