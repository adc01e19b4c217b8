// src/filesystem/store.rs

//! Local bundle store
//!
//! One directory per bundle under the store root. A bundle directory's
//! existence is the authoritative "locally present" signal, so directories
//! are assembled in a hidden staging area and renamed into place only once
//! they are complete. Anything under `.staging/` is invisible to lookups.

use crate::bundle::{BundleId, INDEX_FILE};
use crate::error::{Error, Result};
use crate::filesystem::path::{resolve_visible_within, resolve_within};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const STAGING_DIR: &str = ".staging";

/// Local filesystem mirror of the remote games namespace
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Final directory of a bundle, whether or not it exists
    pub fn bundle_dir(&self, id: &BundleId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Whether the bundle directory is present locally
    pub fn exists(&self, id: &BundleId) -> bool {
        self.bundle_dir(id).is_dir()
    }

    /// Whether the bundle is servable: its `index.html` is present locally
    pub fn is_complete(&self, id: &BundleId) -> bool {
        self.bundle_dir(id).join(INDEX_FILE).is_file()
    }

    /// Absolute path of a caller-supplied relative path inside a bundle
    ///
    /// The relative path comes from request routing and is untrusted:
    /// hidden segments and anything resolving outside the bundle root are
    /// rejected with `PathTraversal`.
    pub fn path(&self, id: &BundleId, relative: &str) -> Result<PathBuf> {
        resolve_visible_within(self.bundle_dir(id), relative)
    }

    /// Path for a relative path that came from a trusted source (a remote
    /// key listed by the store itself). Still contained, hidden files allowed.
    pub fn contained_path(&self, id: &BundleId, relative: &str) -> Result<PathBuf> {
        resolve_within(self.bundle_dir(id), relative)
    }

    /// Allocate a staging directory for a bundle that does not exist yet
    ///
    /// Fails with `AlreadyExists` if the bundle is already present, so an id
    /// maps to at most one published directory.
    pub fn create(&self, id: BundleId) -> Result<BundleDirectory> {
        let target = self.bundle_dir(&id);
        if target.exists() {
            return Err(Error::AlreadyExists(target.display().to_string()));
        }

        let staging = self.root.join(STAGING_DIR).join(id.to_string());
        fs::create_dir_all(self.root.join(STAGING_DIR))?;
        match fs::create_dir(&staging) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Another task is assembling the same bundle
                return Err(Error::AlreadyExists(staging.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        debug!(bundle_id = %id, staging = %staging.display(), "allocated bundle directory");
        Ok(BundleDirectory {
            id,
            staging,
            target,
            published: false,
        })
    }

    /// Remove leftover staging directories from an interrupted process
    pub fn clear_staging(&self) -> Result<usize> {
        let staging_root = self.root.join(STAGING_DIR);
        let mut removed = 0;
        for entry in fs::read_dir(&staging_root)? {
            let entry = entry?;
            if let Err(e) = fs::remove_dir_all(entry.path()) {
                warn!(path = %entry.path().display(), "Failed to remove stale staging dir: {}", e);
            } else {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Identifiers of all published bundles
    pub fn list(&self) -> Result<Vec<BundleId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(id) = entry
                .file_name()
                .to_str()
                .and_then(|name| BundleId::parse(name).ok())
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// A bundle directory under construction
///
/// Writes go to a hidden staging path; [`BundleDirectory::publish`] renames
/// it into the store in one step. Dropping an unpublished directory removes
/// the staging tree, so a failed ingestion or hydration leaves nothing that
/// lookups can reach.
#[derive(Debug)]
pub struct BundleDirectory {
    id: BundleId,
    staging: PathBuf,
    target: PathBuf,
    published: bool,
}

impl BundleDirectory {
    pub fn id(&self) -> BundleId {
        self.id
    }

    /// Directory to write into while the bundle is being assembled
    pub fn path(&self) -> &Path {
        &self.staging
    }

    /// Resolve an untrusted relative path inside the staging directory
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        resolve_within(&self.staging, relative)
    }

    /// Move the assembled directory into the store and make it visible
    pub fn publish(mut self) -> Result<PathBuf> {
        if self.target.exists() {
            return Err(Error::AlreadyExists(self.target.display().to_string()));
        }
        fs::rename(&self.staging, &self.target)?;
        self.published = true;
        debug!(bundle_id = %self.id, path = %self.target.display(), "published bundle directory");
        Ok(self.target.clone())
    }
}

impl Drop for BundleDirectory {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.staging)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!(
                bundle_id = %self.id,
                path = %self.staging.display(),
                "Failed to discard staging directory: {}", e
            );
        }
    }
}
