// src/archive/entry.rs

//! Archive entry metadata and root prefix detection

use crate::error::Result;
use std::io::{Read, Seek};
use zip::ZipArchive;

/// Entries under this namespace are Finder metadata, never bundle content
pub const JUNK_PREFIX: &str = "__MACOSX/";

/// One entry of an uploaded zip, as declared by its central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in the central directory
    pub index: usize,
    /// Slash-separated name exactly as stored (untrusted)
    pub name: String,
    /// Declared uncompressed size
    pub size: u64,
    pub is_dir: bool,
    /// POSIX mode bits, when the archive was written on a unix host
    pub mode: Option<u32>,
}

impl ArchiveEntry {
    pub fn is_junk(&self) -> bool {
        self.name.starts_with(JUNK_PREFIX)
    }

    /// Name with the archive's root prefix removed
    ///
    /// Returns `None` when stripping leaves nothing, i.e. the entry is the
    /// wrapping directory itself.
    pub fn relative_name<'a>(&'a self, prefix: &str) -> Option<&'a str> {
        let name = if prefix.is_empty() {
            self.name.as_str()
        } else {
            self.name.strip_prefix(prefix).unwrap_or(&self.name)
        };
        (!name.is_empty()).then_some(name)
    }
}

/// Read every entry's metadata from the central directory
pub fn read_entries<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let file = archive.by_index_raw(index)?;
        entries.push(ArchiveEntry {
            index,
            name: file.name().to_string(),
            size: file.size(),
            is_dir: file.is_dir(),
            mode: file.unix_mode(),
        });
    }
    Ok(entries)
}

/// Determine the single wrapping folder shared by all non-junk entries
///
/// Returns `"<folder>/"` when every non-junk entry's first segment agrees,
/// and an empty string when any entry sits at the top level, when first
/// segments disagree, or when there are no entries. A first segment that
/// is not a plain folder name (`.`, `..`, backslashes, NUL) never becomes
/// the prefix, so such entries reach path validation unstripped.
///
/// # Examples
///
/// ```
/// use arcade::archive::root_prefix;
///
/// assert_eq!(root_prefix(["game/", "game/index.html", "__MACOSX/._x"]), "game/");
/// assert_eq!(root_prefix(["index.html", "assets/a.png"]), "");
/// assert_eq!(root_prefix(["a/index.html", "b/a.png"]), "");
/// ```
pub fn root_prefix<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    let mut root: Option<&str> = None;

    for name in names {
        if name.starts_with(JUNK_PREFIX) {
            continue;
        }

        let Some((first, _)) = name.split_once('/') else {
            return String::new();
        };
        if first.is_empty()
            || first == "."
            || first == ".."
            || first.contains('\\')
            || first.contains('\0')
        {
            return String::new();
        }

        match root {
            None => root = Some(first),
            Some(r) if r == first => {}
            Some(_) => return String::new(),
        }
    }

    root.map(|r| format!("{}/", r)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            index: 0,
            name: name.to_string(),
            size: 0,
            is_dir: name.ends_with('/'),
            mode: None,
        }
    }

    #[test]
    fn test_single_wrapping_folder() {
        assert_eq!(
            root_prefix(["game/index.html", "game/assets/a.png"]),
            "game/"
        );
    }

    #[test]
    fn test_top_level_entry_disables_prefix() {
        assert_eq!(root_prefix(["game/index.html", "readme.txt"]), "");
    }

    #[test]
    fn test_junk_ignored_for_prefix() {
        assert_eq!(
            root_prefix(["__MACOSX/game/._index.html", "game/index.html"]),
            "game/"
        );
    }

    #[test]
    fn test_empty_archive_has_no_prefix() {
        assert_eq!(root_prefix(std::iter::empty()), "");
        assert_eq!(root_prefix(["__MACOSX/._x"]), "");
    }

    #[test]
    fn test_leading_slash_disables_prefix() {
        assert_eq!(root_prefix(["/game/index.html", "/game/a.png"]), "");
    }

    #[test]
    fn test_dot_segments_never_become_prefix() {
        assert_eq!(root_prefix(["../index.html", "../passwd"]), "");
        assert_eq!(root_prefix(["./index.html", "./a.png"]), "");
        assert_eq!(root_prefix(["a\\b/index.html"]), "");
    }

    #[test]
    fn test_prefix_is_not_case_folded() {
        assert_eq!(root_prefix(["Game/index.html", "game/a.png"]), "");
    }

    #[test]
    fn test_relative_name() {
        assert_eq!(entry("game/index.html").relative_name("game/"), Some("index.html"));
        assert_eq!(entry("game/").relative_name("game/"), None);
        assert_eq!(entry("index.html").relative_name(""), Some("index.html"));
        assert!(entry("__MACOSX/._a").is_junk());
    }
}
