// src/filesystem/path.rs

//! Path containment for untrusted relative paths
//!
//! Zip entry names, remote object keys and request paths all arrive as
//! untrusted slash-separated text. Every component that turns such text into
//! a filesystem location goes through [`resolve_within`], which resolves
//! `.` and `..` lexically and fails closed if the result is not a strict
//! descendant of the root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize an untrusted slash-separated path into its segments
///
/// Empty and `.` segments are dropped, `..` pops the previous segment.
/// Popping past the start, or a segment carrying a backslash or NUL, is a
/// traversal attempt. Leading slashes are treated as relative, matching how
/// joining onto a root behaves for zip entries.
///
/// # Examples
///
/// ```
/// use arcade::filesystem::path::normalize_relative;
///
/// assert_eq!(normalize_relative("a/./b/../c").unwrap(), vec!["a", "c"]);
/// assert!(normalize_relative("../../etc/passwd").is_err());
/// ```
pub fn normalize_relative(path: &str) -> Result<Vec<&str>> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(Error::PathTraversal(path.to_string()));
                }
            }
            s if s.contains('\\') || s.contains('\0') => {
                return Err(Error::PathTraversal(path.to_string()));
            }
            s => segments.push(s),
        }
    }

    Ok(segments)
}

/// Resolve an untrusted relative path inside `root`
///
/// The returned path is always `root` joined with one or more normal
/// components. A path that normalizes to nothing resolves to the root
/// itself, which is not a strict descendant and is rejected.
///
/// # Examples
///
/// ```
/// use arcade::filesystem::path::resolve_within;
/// use std::path::{Path, PathBuf};
///
/// let root = Path::new("/srv/games/abc");
/// assert_eq!(
///     resolve_within(root, "assets/a.png").unwrap(),
///     PathBuf::from("/srv/games/abc/assets/a.png")
/// );
/// assert!(resolve_within(root, "../../etc/passwd").is_err());
/// assert!(resolve_within(root, "assets/..").is_err());
/// ```
pub fn resolve_within(root: impl AsRef<Path>, relative: &str) -> Result<PathBuf> {
    let root = root.as_ref();
    let segments = normalize_relative(relative)?;

    if segments.is_empty() {
        return Err(Error::PathTraversal(format!(
            "{} resolves to the root {}",
            relative,
            root.display()
        )));
    }

    let mut resolved = root.to_path_buf();
    for segment in &segments {
        resolved.push(segment);
    }

    // A segment like "C:" can still reset the path on some platforms
    let escaped = resolved
        .strip_prefix(root)
        .map(|rest| {
            rest.as_os_str().is_empty()
                || rest.components().any(|c| !matches!(c, Component::Normal(_)))
        })
        .unwrap_or(true);
    if escaped {
        return Err(Error::PathTraversal(format!(
            "{} escapes root {}",
            relative,
            root.display()
        )));
    }

    Ok(resolved)
}

/// Resolve a request-supplied path, additionally rejecting hidden segments
///
/// Serving never exposes dot-files, and this also keeps the store's staging
/// area and partial downloads out of reach of request routing.
pub fn resolve_visible_within(root: impl AsRef<Path>, relative: &str) -> Result<PathBuf> {
    if relative.split('/').any(|segment| segment.starts_with('.')) {
        return Err(Error::PathTraversal(format!(
            "hidden path segment in {}",
            relative
        )));
    }
    resolve_within(root, relative)
}
