// src/sync/hydrate.rs
//! On-demand hydration of a single bundle
//!
//! A request for a bundle that is not present locally triggers a pull of
//! `games/<id>/` from the remote mirror. Concurrent triggers for the same id
//! share one pull. The bundle is assembled in staging and published only
//! after every file has been written, so a failed pull leaves no trace and
//! the next request simply tries again.

use crate::bundle::{BundleId, INDEX_FILE};
use crate::error::{Error, Result};
use crate::filesystem::BundleStore;
use crate::remote::{RemoteStore, list_all};
use crate::sync::{Coalescer, SyncConfig, download_to};
use futures::FutureExt;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Result of a successful hydration request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrateOutcome {
    /// The bundle was already local; nothing was fetched
    AlreadyPresent,
    /// The bundle was pulled from the remote mirror
    Hydrated { files: usize, bytes: u64 },
}

/// Lazy per-bundle puller with single-flight semantics
pub struct Hydrator {
    store: BundleStore,
    remote: Arc<dyn RemoteStore>,
    config: SyncConfig,
    inflight: Coalescer<HydrateOutcome>,
}

impl Hydrator {
    pub fn new(store: BundleStore, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> Self {
        Self {
            store,
            remote,
            config,
            inflight: Coalescer::new(),
        }
    }

    /// Ensure a bundle is present locally
    ///
    /// Returns `NotFound` when the remote has no `index.html` for the id and
    /// `RemoteUnavailable` on transport failures. Either way nothing is left
    /// on disk.
    pub async fn hydrate(&self, id: BundleId) -> Result<HydrateOutcome> {
        if self.store.exists(&id) {
            return Ok(HydrateOutcome::AlreadyPresent);
        }
        self.inflight
            .run(&id.to_string(), || self.pull(id))
            .await
    }

    /// Callers that joined an already running pull
    pub fn coalesced_count(&self) -> u64 {
        self.inflight.coalesced_count()
    }

    #[instrument(skip(self), fields(remote = %self.remote.name()))]
    async fn pull(&self, id: BundleId) -> Result<HydrateOutcome> {
        // A previous flight may have finished between the check and now
        if self.store.exists(&id) {
            return Ok(HydrateOutcome::AlreadyPresent);
        }

        let keys = list_all(self.remote.as_ref(), &id.remote_prefix()).await?;
        let files: Vec<String> = keys
            .iter()
            .filter_map(|key| id.relative_from_key(key))
            .map(str::to_string)
            .collect();

        if !files.iter().any(|relative| relative == INDEX_FILE) {
            debug!("Remote has {} objects but no {}", files.len(), INDEX_FILE);
            return Err(Error::NotFound(id.marker_key()));
        }

        let dir = self.store.create(id)?;
        let mut jobs = Vec::with_capacity(files.len());
        for relative in &files {
            jobs.push((id.remote_key(relative), dir.resolve(relative)?));
        }

        // Drain every download before judging the result so no write is
        // still pending when a failed staging directory is discarded.
        let results: Vec<Result<u64>> = stream::iter(jobs)
            .map(|(key, dest)| fetch_file(Arc::clone(&self.remote), key, dest).boxed())
            .buffer_unordered(self.config.download_concurrency.max(1))
            .collect()
            .await;
        let bytes = results.into_iter().sum::<Result<u64>>()?;

        let path = dir.publish()?;
        info!(
            "Hydrated bundle {} ({} files, {} bytes) into {}",
            id,
            files.len(),
            bytes,
            path.display()
        );

        Ok(HydrateOutcome::Hydrated {
            files: files.len(),
            bytes,
        })
    }
}

async fn fetch_file(remote: Arc<dyn RemoteStore>, key: String, dest: PathBuf) -> Result<u64> {
    let written = download_to(remote.as_ref(), &key, &dest).await?;
    Ok(written as u64)
}
