// src/archive/mod.rs

//! Archive ingestion
//!
//! Turns an untrusted zip upload into a freshly minted bundle directory:
//! - strips a single wrapping folder so `game/index.html` lands at `<id>/index.html`
//! - skips `__MACOSX/` metadata
//! - validates every entry path before the first byte is written
//! - publishes the directory only after every entry extracted cleanly

mod entry;

pub use entry::{read_entries, root_prefix, ArchiveEntry, JUNK_PREFIX};

use crate::bundle::BundleId;
use crate::error::{Error, Result};
use crate::filesystem::{BundleDirectory, BundleStore};
use std::fs::{self, File};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Extraction planned for one entry after validation
#[derive(Debug)]
struct PlannedEntry<'a> {
    entry: &'a ArchiveEntry,
    target: PathBuf,
}

/// Ingest an untrusted zip archive into a new bundle
///
/// On any failure the partially written staging directory is discarded and
/// no bundle becomes visible in the store.
pub fn ingest<R: Read + Seek>(store: &BundleStore, reader: R) -> Result<BundleId> {
    let mut archive =
        ZipArchive::new(reader).map_err(|e| Error::InvalidArchive(e.to_string()))?;
    let entries = read_entries(&mut archive)?;
    let prefix = root_prefix(entries.iter().map(|e| e.name.as_str()));

    let id = BundleId::new();
    let dir = store.create(id)?;

    let plan = plan_extraction(&dir, &entries, &prefix)?;
    let (files, dirs) = extract(&mut archive, &plan)?;

    dir.publish()?;

    info!(
        bundle_id = %id,
        files,
        dirs,
        prefix = %prefix,
        "Ingested bundle"
    );
    Ok(id)
}

/// Validate every entry path and compute its target inside the directory
///
/// Any entry escaping the directory aborts the whole archive.
fn plan_extraction<'a>(
    dir: &BundleDirectory,
    entries: &'a [ArchiveEntry],
    prefix: &str,
) -> Result<Vec<PlannedEntry<'a>>> {
    let mut plan = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.is_junk() {
            continue;
        }
        let Some(relative) = entry.relative_name(prefix) else {
            continue;
        };

        let target = dir.resolve(relative).map_err(|e| match e {
            Error::PathTraversal(_) => Error::PathTraversal(entry.name.clone()),
            other => other,
        })?;
        plan.push(PlannedEntry { entry, target });
    }

    Ok(plan)
}

fn extract<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    plan: &[PlannedEntry<'_>],
) -> Result<(usize, usize)> {
    let mut files = 0;
    let mut dirs = 0;

    for planned in plan {
        let entry = planned.entry;

        if entry.is_dir {
            fs::create_dir_all(&planned.target)?;
            apply_mode(&planned.target, entry.mode, true)?;
            dirs += 1;
            continue;
        }

        if let Some(parent) = planned.target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut source = archive.by_index(entry.index)?;
        let mut out = File::create(&planned.target)?;
        // The zip reader reports a CRC mismatch as InvalidData at EOF
        io::copy(&mut source, &mut out).map_err(|e| {
            if e.kind() == io::ErrorKind::InvalidData {
                Error::InvalidArchive(format!("{}: {}", entry.name, e))
            } else {
                Error::Io(e)
            }
        })?;
        drop(out);
        apply_mode(&planned.target, entry.mode, false)?;

        debug!(entry = %entry.name, size = entry.size, "extracted");
        files += 1;
    }

    Ok((files, dirs))
}

/// Apply the archive's declared permission bits
///
/// Only the rwx bits are honoured, and the owner always keeps enough access
/// for the server to read, re-sync and clean up the bundle.
#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>, is_dir: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode else {
        return Ok(());
    };
    let owner = if is_dir { 0o700 } else { 0o600 };
    fs::set_permissions(path, fs::Permissions::from_mode((mode & 0o777) | owner))?;
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>, _is_dir: bool) -> Result<()> {
    Ok(())
}
