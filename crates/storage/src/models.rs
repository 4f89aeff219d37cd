//! Storage models.
//!
//! Metadata returned by storage backends when listing directories or
//! inspecting a single entry.

use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// The two kinds of node a storage backend knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
}

/// Entry metadata returned by storage backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    /// Relative path from storage root
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Size in bytes (always zero for directories)
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl EntryInfo {
    pub fn file(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            size,
            modified,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, modified: OffsetDateTime) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            size: 0,
            modified,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Final path segment. Backends never hand out an empty path, so this
    /// only falls back to the empty string for a malformed [`EntryInfo`]
    /// constructed by hand.
    pub fn name(&self) -> &str {
        self.path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
    }

    pub fn parent(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_and_parent() {
        let info = EntryInfo::file("Artist - Song (Charter)/notes.chart", 10, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(info.name(), "notes.chart");
        assert_eq!(info.parent(), Path::new("Artist - Song (Charter)"));
        assert!(!info.is_dir());

        let root_child = EntryInfo::directory("backups", OffsetDateTime::UNIX_EPOCH);
        assert_eq!(root_child.parent(), Path::new(""));
        assert_eq!(root_child.size, 0);
    }
}
