// src/sync/mod.rs
//! Keeping the local bundle store and the remote mirror in step
//!
//! - [`Reconciler`]: bulk pass at startup, pulls every complete remote bundle
//!   and fills gaps in local ones
//! - [`Hydrator`]: pulls a single bundle on a local miss, coalescing
//!   concurrent requests for the same id
//! - [`upload_bundle`]: pushes a freshly ingested bundle to the mirror
//!
//! Local files are never overwritten by remote content, and nothing is ever
//! deleted on either side.

mod coalesce;
mod hydrate;
mod reconcile;
mod upload;

pub use coalesce::Coalescer;
pub use hydrate::{HydrateOutcome, Hydrator};
pub use reconcile::{ReconcileReport, Reconciler};
pub use upload::{UploadReport, upload_bundle};

use crate::error::Result;
use crate::remote::RemoteStore;
use std::path::Path;
use tokio::fs;

/// Default number of concurrent object downloads per bundle
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 8;

/// Settings shared by the reconciler and the hydrator
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Skip startup reconciliation entirely
    pub offline: bool,
    /// Parallel downloads within one bundle
    pub download_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            offline: false,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }
}

/// Fetch `key` and write it to `dest`, creating parent directories
///
/// Returns the number of bytes written.
pub(crate) async fn download_to(
    remote: &dyn RemoteStore,
    key: &str,
    dest: &Path,
) -> Result<usize> {
    let data = remote.get(key).await?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(dest, &data).await?;
    Ok(data.len())
}
