// src/sync/reconcile.rs
//! Bulk reconciliation from the remote mirror
//!
//! Lists the whole games namespace once, groups keys by bundle, and pulls
//! every bundle whose `index.html` marker is present remotely. Bundles that
//! are missing locally are assembled in staging and published only once the
//! marker has been downloaded. Bundles that already exist get their missing
//! files filled in place; files already on disk are left alone.

use crate::bundle::{BundleId, GAMES_PREFIX, INDEX_FILE, RemoteObjectKey};
use crate::error::{Error, Result};
use crate::filesystem::BundleStore;
use crate::remote::{RemoteStore, list_all};
use crate::sync::{SyncConfig, download_to};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Result of a reconciliation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Distinct bundle segments found under `games/`
    pub bundles_seen: usize,
    /// Bundles pulled or gap-filled
    pub synced: usize,
    /// Bundles without a remote marker or with an unusable id
    pub skipped: usize,
    /// Bundles abandoned this run (marker download failed, disk error)
    pub failed: usize,
    /// Files written locally
    pub files_downloaded: usize,
    /// Files already present and left untouched
    pub files_present: usize,
    /// Files that could not be fetched or placed
    pub files_failed: usize,
}

/// Remote keys of one bundle
#[derive(Debug, Default)]
struct RemoteBundle {
    files: Vec<String>,
    has_marker: bool,
}

/// What happened to a single file
enum FileOutcome {
    Downloaded,
    Present,
}

/// Bulk remote-to-local synchronizer
pub struct Reconciler {
    store: BundleStore,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(store: BundleStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
        }
    }

    /// Bring every complete remote bundle into the local store
    ///
    /// Fails only if the namespace cannot be listed. Per-bundle and per-file
    /// failures are logged, counted, and retried by the next run.
    #[instrument(skip(self), fields(remote = %self.remote.name()))]
    pub async fn reconcile_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        if self.config.offline {
            info!("Offline mode, skipping reconciliation");
            return Ok(report);
        }

        let keys = list_all(self.remote.as_ref(), GAMES_PREFIX).await?;
        let groups = group_keys(&keys);
        info!(
            "Found {} remote objects across {} bundles",
            keys.len(),
            groups.len()
        );

        for (segment, bundle) in groups {
            report.bundles_seen += 1;

            if !bundle.has_marker {
                debug!("Skipping {} - no {} in remote", segment, INDEX_FILE);
                report.skipped += 1;
                continue;
            }

            let id = match BundleId::parse(&segment) {
                Ok(id) => id,
                Err(e) => {
                    warn!("Skipping remote bundle {}: {}", segment, e);
                    report.skipped += 1;
                    continue;
                }
            };

            let result = if self.store.exists(&id) {
                self.fill_gaps(id, bundle.files, &mut report).await
            } else {
                self.pull_new(id, bundle.files, &mut report).await
            };

            match result {
                Ok(()) => report.synced += 1,
                Err(Error::AlreadyExists(_)) => {
                    debug!(bundle_id = %id, "Bundle is being assembled by another task");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(bundle_id = %id, "Failed to reconcile bundle: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Reconciliation complete: {} synced, {} skipped, {} failed ({} files downloaded, {} already present, {} failed)",
            report.synced,
            report.skipped,
            report.failed,
            report.files_downloaded,
            report.files_present,
            report.files_failed
        );

        Ok(report)
    }

    /// Assemble a bundle that does not exist locally
    async fn pull_new(
        &self,
        id: BundleId,
        files: Vec<String>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let dir = self.store.create(id)?;

        let mut jobs = Vec::with_capacity(files.len());
        for relative in files {
            match dir.resolve(&relative) {
                Ok(dest) => jobs.push((relative, dest)),
                Err(e) => {
                    warn!(bundle_id = %id, file = %relative, "Refusing remote file: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        let results: Vec<(String, Result<()>)> = stream::iter(jobs)
            .map(|(relative, dest)| {
                fetch_file(Arc::clone(&self.remote), id, relative, dest).boxed()
            })
            .buffer_unordered(self.config.download_concurrency.max(1))
            .collect()
            .await;

        let mut marker_ok = false;
        for (relative, result) in results {
            match result {
                Ok(()) => {
                    report.files_downloaded += 1;
                    marker_ok |= relative == INDEX_FILE;
                }
                Err(e) => {
                    warn!(bundle_id = %id, file = %relative, "Failed to download: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        if !marker_ok {
            // Dropping the directory discards the partial download
            return Err(Error::RemoteUnavailable(format!(
                "{} could not be downloaded",
                id.marker_key()
            )));
        }

        match dir.publish() {
            Ok(path) => {
                info!(bundle_id = %id, path = %path.display(), "Pulled bundle from remote");
                Ok(())
            }
            // Hydrated concurrently; the published copy came from the same remote
            Err(Error::AlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Download files missing from an existing bundle, in place
    async fn fill_gaps(
        &self,
        id: BundleId,
        files: Vec<String>,
        report: &mut ReconcileReport,
    ) -> Result<()> {
        let results: Vec<(String, Result<FileOutcome>)> = stream::iter(files)
            .map(|relative| {
                fill_file(self.store.clone(), Arc::clone(&self.remote), id, relative).boxed()
            })
            .buffer_unordered(self.config.download_concurrency.max(1))
            .collect()
            .await;

        let mut downloaded = 0;
        for (relative, result) in results {
            match result {
                Ok(FileOutcome::Downloaded) => downloaded += 1,
                Ok(FileOutcome::Present) => report.files_present += 1,
                Err(e) => {
                    warn!(bundle_id = %id, file = %relative, "Failed to fill gap: {}", e);
                    report.files_failed += 1;
                }
            }
        }

        if downloaded > 0 {
            info!(bundle_id = %id, "Filled {} missing files", downloaded);
        }
        report.files_downloaded += downloaded;
        Ok(())
    }
}

async fn fetch_file(
    remote: Arc<dyn RemoteStore>,
    id: BundleId,
    relative: String,
    dest: PathBuf,
) -> (String, Result<()>) {
    let result = download_to(remote.as_ref(), &id.remote_key(&relative), &dest)
        .await
        .map(|_| ());
    (relative, result)
}

async fn fill_file(
    store: BundleStore,
    remote: Arc<dyn RemoteStore>,
    id: BundleId,
    relative: String,
) -> (String, Result<FileOutcome>) {
    let result = fill_one(&store, remote.as_ref(), id, &relative).await;
    (relative, result)
}

async fn fill_one(
    store: &BundleStore,
    remote: &dyn RemoteStore,
    id: BundleId,
    relative: &str,
) -> Result<FileOutcome> {
    let dest = store.contained_path(&id, relative)?;
    if fs::try_exists(&dest).await? {
        return Ok(FileOutcome::Present);
    }

    // Download beside the destination under a hidden name, then move it
    // into place, so a reader never sees a half-written file.
    let part = part_path(&dest)?;
    download_to(remote, &id.remote_key(relative), &part).await?;
    settle_part(&part, &dest).await
}

/// Move a finished download into place unless `dest` appeared meanwhile
async fn settle_part(part: &Path, dest: &Path) -> Result<FileOutcome> {
    if fs::try_exists(dest).await? {
        // Keep what is there
        if let Err(e) = fs::remove_file(part).await {
            warn!(path = %part.display(), "Failed to remove partial download: {}", e);
        }
        return Ok(FileOutcome::Present);
    }
    fs::rename(part, dest).await?;
    Ok(FileOutcome::Downloaded)
}

/// Hidden sibling used while a gap-filled file is in transit
fn part_path(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidPath(dest.display().to_string()))?;
    Ok(dest.with_file_name(format!(".{name}.part")))
}

/// Group listed keys by their bundle segment
fn group_keys(keys: &[String]) -> BTreeMap<String, RemoteBundle> {
    let mut groups: BTreeMap<String, RemoteBundle> = BTreeMap::new();
    for key in keys {
        let Some(parsed) = RemoteObjectKey::split(key) else {
            debug!("Ignoring remote key that names no bundle file: {}", key);
            continue;
        };
        let bundle = groups.entry(parsed.bundle.to_string()).or_default();
        bundle.has_marker |= parsed.is_marker();
        bundle.files.push(parsed.relative.to_string());
    }
    groups
}
