// src/remote/mod.rs
//! Remote mirror client
//!
//! A thin capability over the durable object store: list by prefix, get,
//! put. Implementations:
//! - [`R2Store`]: Cloudflare R2 (or any S3-compatible endpoint) via rust-s3
//! - [`MemoryStore`]: in-process map, for tests and offline development
//!
//! No retry or backoff lives here. A transient failure surfaces as
//! `RemoteUnavailable` and the next natural trigger (cache miss, startup
//! reconciliation) tries again.

mod memory;
mod r2;

pub use memory::{MemoryStore, OpCounts};
pub use r2::R2Store;

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;

/// Lazily paginated sequence of object keys
pub type KeyStream<'a> = BoxStream<'a, Result<String>>;

/// Operations the sync layer needs from the remote object store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List every key under `prefix`
    ///
    /// Pagination happens underneath as the stream is polled. Calling
    /// `list` again restarts from the first page.
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a>;

    /// Fetch an object's bytes, or `NotFound`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store an object with the given content type
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}

/// Drain [`RemoteStore::list`] into a vector
pub async fn list_all(remote: &dyn RemoteStore, prefix: &str) -> Result<Vec<String>> {
    remote.list(prefix).try_collect().await
}

/// Content type recorded for an object, guessed from its name
pub fn content_type_for(name: &str) -> String {
    mime_guess::from_path(name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Connection settings for an S3-compatible bucket
#[derive(Debug, Clone, Default)]
pub struct RemoteConfig {
    pub bucket: String,
    /// Cloudflare account id; selects the R2 endpoint
    pub account_id: Option<String>,
    /// Explicit endpoint URL, takes precedence over `account_id`
    pub endpoint: Option<String>,
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}
