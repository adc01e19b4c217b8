// src/sync/upload.rs
//! Mirror a local bundle to the remote store
//!
//! Runs after ingestion, off the request path. Every file is put under
//! `games/<id>/` with a content type guessed from its name. `index.html` goes
//! last and only if everything else made it, so a remote bundle never looks
//! complete while assets are still missing.

use crate::bundle::{BundleId, INDEX_FILE};
use crate::error::{Error, Result};
use crate::filesystem::BundleStore;
use crate::remote::{RemoteStore, content_type_for};
use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const UPLOAD_CONCURRENCY: usize = 4;

/// Summary of a finished upload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub files: usize,
    pub bytes: u64,
}

/// Upload every file of a local bundle
///
/// Fails with `RemoteUnavailable` if any file could not be stored; in that
/// case the marker is withheld and the remote copy stays incomplete.
pub async fn upload_bundle(
    store: &BundleStore,
    remote: &dyn RemoteStore,
    id: BundleId,
) -> Result<UploadReport> {
    let root = store.bundle_dir(&id);
    if !root.is_dir() {
        return Err(Error::NotFound(root.display().to_string()));
    }

    let files = tokio::task::spawn_blocking(move || collect_files(&root))
        .await
        .map_err(|e| Error::Io(io::Error::other(e)))??;

    let (markers, assets): (Vec<_>, Vec<_>) = files
        .into_iter()
        .partition(|(_, relative)| relative == INDEX_FILE);

    let total = assets.len() + markers.len();
    let mut report = UploadReport::default();
    let mut failed = 0usize;

    let results: Vec<(String, Result<u64>)> = stream::iter(assets)
        .map(|(path, relative)| async move {
            let result = put_file(remote, id, &path, &relative).await;
            (relative, result)
        })
        .buffer_unordered(UPLOAD_CONCURRENCY)
        .collect()
        .await;

    for (relative, result) in results {
        match result {
            Ok(bytes) => {
                report.files += 1;
                report.bytes += bytes;
            }
            Err(e) => {
                warn!(bundle_id = %id, file = %relative, "Failed to upload: {}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(Error::RemoteUnavailable(format!(
            "{failed} of {total} files failed to upload for {id}; {INDEX_FILE} withheld"
        )));
    }

    for (path, relative) in markers {
        report.bytes += put_file(remote, id, &path, &relative).await?;
        report.files += 1;
    }

    info!(
        "Uploaded bundle {} to {} ({} files, {} bytes)",
        id,
        remote.name(),
        report.files,
        report.bytes
    );
    Ok(report)
}

async fn put_file(remote: &dyn RemoteStore, id: BundleId, path: &Path, relative: &str) -> Result<u64> {
    let data = tokio::fs::read(path).await?;
    let len = data.len() as u64;
    remote
        .put(&id.remote_key(relative), data, &content_type_for(relative))
        .await?;
    debug!(bundle_id = %id, file = relative, bytes = len, "uploaded file");
    Ok(len)
}

/// Regular files under `root` with their slash-separated relative paths
fn collect_files(root: &Path) -> Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let segments: Option<Vec<&str>> = relative.iter().map(|s| s.to_str()).collect();
        match segments {
            Some(segments) => files.push((entry.path().to_path_buf(), segments.join("/"))),
            None => warn!(path = %entry.path().display(), "Skipping non UTF-8 file name"),
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryStore;
    use std::fs;

    fn local_bundle(store: &BundleStore) -> BundleId {
        let id = BundleId::new();
        let dir = store.create(id).unwrap();
        fs::write(dir.path().join(INDEX_FILE), b"<html></html>").unwrap();
        fs::create_dir_all(dir.path().join("js")).unwrap();
        fs::write(dir.path().join("js/app.js"), b"run()").unwrap();
        fs::write(dir.path().join("sprite.png"), [0u8; 10]).unwrap();
        dir.publish().unwrap();
        id
    }

    #[tokio::test]
    async fn test_uploads_every_file_with_content_type() {
        let temp = tempfile::tempdir().unwrap();
        let store = BundleStore::open(temp.path()).unwrap();
        let remote = MemoryStore::new();
        let id = local_bundle(&store);

        let report = upload_bundle(&store, &remote, id).await.unwrap();
        assert_eq!(report.files, 3);
        assert_eq!(report.bytes, 13 + 5 + 10);

        assert_eq!(remote.object(&id.marker_key()).unwrap(), b"<html></html>");
        assert_eq!(remote.content_type(&id.marker_key()).unwrap(), "text/html");
        assert_eq!(
            remote.content_type(&id.remote_key("sprite.png")).unwrap(),
            "image/png"
        );
        assert!(remote.object(&id.remote_key("js/app.js")).is_some());
    }

    #[tokio::test]
    async fn test_marker_withheld_when_asset_fails() {
        let temp = tempfile::tempdir().unwrap();
        let store = BundleStore::open(temp.path()).unwrap();
        let remote = MemoryStore::new();
        let id = local_bundle(&store);
        remote.fail_key(&id.remote_key("js/app.js"));

        assert!(matches!(
            upload_bundle(&store, &remote, id).await,
            Err(Error::RemoteUnavailable(_))
        ));
        assert!(remote.object(&id.marker_key()).is_none());
        assert!(remote.object(&id.remote_key("sprite.png")).is_some());
    }

    #[tokio::test]
    async fn test_missing_bundle() {
        let temp = tempfile::tempdir().unwrap();
        let store = BundleStore::open(temp.path()).unwrap();
        let remote = MemoryStore::new();
        assert!(matches!(
            upload_bundle(&store, &remote, BundleId::new()).await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(remote.op_counts().total(), 0);
    }
}
