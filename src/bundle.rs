// src/bundle.rs

//! Bundle identifiers and the remote key layout
//!
//! Every bundle lives remotely under `games/<BundleId>/<relativePath>`.
//! The mapping between a local relative path and its remote key is a pure
//! prefix transform, so it can be inverted without any lookup.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Remote namespace holding every bundle
pub const GAMES_PREFIX: &str = "games/";

/// Remote namespace for standalone uploaded media
pub const MISC_PREFIX: &str = "misc-files/";

/// File whose presence marks a bundle as complete, locally and remotely
pub const INDEX_FILE: &str = "index.html";

/// Opaque, time-ordered bundle identifier (UUIDv7)
///
/// The textual form is the hyphenated lowercase UUID, which sorts
/// lexically in mint order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(Uuid);

impl BundleId {
    /// Mint a fresh identifier
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse an identifier received from an untrusted source
    pub fn parse(s: &str) -> Result<Self> {
        // Only the canonical hyphenated form doubles as a directory name
        if s.len() != 36 {
            return Err(Error::InvalidBundleId(s.to_string()));
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::InvalidBundleId(s.to_string()))
    }

    /// Remote prefix for this bundle, with trailing slash
    pub fn remote_prefix(&self) -> String {
        format!("{}{}/", GAMES_PREFIX, self)
    }

    /// Remote key for a file inside this bundle
    pub fn remote_key(&self, relative: &str) -> String {
        format!("{}{}", self.remote_prefix(), relative.trim_start_matches('/'))
    }

    /// Remote key of this bundle's completeness marker
    pub fn marker_key(&self) -> String {
        self.remote_key(INDEX_FILE)
    }

    /// Inverse of [`BundleId::remote_key`]
    ///
    /// Returns `None` if `key` is not under this bundle's prefix, names the
    /// prefix itself, or is a folder marker ending in `/`.
    pub fn relative_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        let prefix = self.remote_prefix();
        key.strip_prefix(prefix.as_str())
            .filter(|rel| !rel.is_empty() && !rel.ends_with('/'))
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for BundleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A remote key split into its bundle segment and relative path
///
/// Keys shaped like `games/<id>` or `games/<id>/` carry no file and are
/// rejected, as are keys outside the games namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObjectKey<'a> {
    /// Raw first path segment after `games/` (not yet validated as an id)
    pub bundle: &'a str,
    /// Slash-separated path below the bundle prefix
    pub relative: &'a str,
}

impl<'a> RemoteObjectKey<'a> {
    pub fn split(key: &'a str) -> Option<Self> {
        let rest = key.strip_prefix(GAMES_PREFIX)?;
        let (bundle, relative) = rest.split_once('/')?;
        // Folder markers ("assets/") name no file
        if bundle.is_empty() || relative.is_empty() || relative.ends_with('/') {
            return None;
        }
        Some(Self { bundle, relative })
    }

    /// Whether this key is the completeness marker directly under its bundle
    pub fn is_marker(&self) -> bool {
        self.relative == INDEX_FILE
    }
}
