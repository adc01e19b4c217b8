// src/sync/coalesce.rs
//! Request coalescing (singleflight pattern)
//!
//! When several tasks ask for the same key concurrently, only the first runs
//! the work. The others subscribe to its outcome and receive a copy of the
//! same result, success or failure.

use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Outcome broadcast to coalesced waiters
#[derive(Clone)]
enum Shared<T> {
    Success(T),
    Failure(Arc<Error>),
}

/// Keyed singleflight
pub struct Coalescer<T> {
    inflight: DashMap<String, broadcast::Sender<Shared<T>>>,
    coalesced_count: AtomicU64,
}

impl<T: Clone + Send + 'static> Coalescer<T> {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
            coalesced_count: AtomicU64::new(0),
        }
    }

    /// Run `work` for `key`, or join the run already in flight
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let waiter = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(entry) => Some(entry.get().subscribe()),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(1);
                entry.insert(tx);
                None
            }
        };

        if let Some(mut rx) = waiter {
            self.coalesced_count.fetch_add(1, Ordering::Relaxed);
            debug!(%key, "joining in-flight operation");
            return match rx.recv().await {
                Ok(Shared::Success(value)) => Ok(value),
                Ok(Shared::Failure(err)) => Err(duplicate(&err)),
                Err(_) => Err(Error::RemoteUnavailable(format!(
                    "in-flight operation for {key} was abandoned"
                ))),
            };
        }

        let mut guard = InflightGuard {
            map: &self.inflight,
            key,
            armed: true,
        };

        let result = work().await;

        // Deregister before broadcasting so late arrivals start a fresh run
        // instead of subscribing to a channel that already fired.
        guard.armed = false;
        if let Some((_, tx)) = self.inflight.remove(key) {
            let shared = match &result {
                Ok(value) => Shared::Success(value.clone()),
                Err(err) => Shared::Failure(Arc::new(duplicate(err))),
            };
            let _ = tx.send(shared);
        }

        result
    }

    /// Number of callers that joined an in-flight run instead of starting one
    pub fn coalesced_count(&self) -> u64 {
        self.coalesced_count.load(Ordering::Relaxed)
    }

    pub fn inflight_count(&self) -> usize {
        self.inflight.len()
    }
}

impl<T: Clone + Send + 'static> Default for Coalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the in-flight entry if the leader is cancelled or panics, which
/// closes the channel and releases every waiter.
struct InflightGuard<'a, T> {
    map: &'a DashMap<String, broadcast::Sender<Shared<T>>>,
    key: &'a str,
    armed: bool,
}

impl<T> Drop for InflightGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.map.remove(self.key);
        }
    }
}

/// Copy an error for another waiter
fn duplicate(err: &Error) -> Error {
    match err {
        Error::InvalidArchive(m) => Error::InvalidArchive(m.clone()),
        Error::PathTraversal(m) => Error::PathTraversal(m.clone()),
        Error::InvalidPath(m) => Error::InvalidPath(m.clone()),
        Error::InvalidBundleId(m) => Error::InvalidBundleId(m.clone()),
        Error::NotFound(m) => Error::NotFound(m.clone()),
        Error::RemoteUnavailable(m) => Error::RemoteUnavailable(m.clone()),
        Error::AlreadyExists(m) => Error::AlreadyExists(m.clone()),
        Error::Config(m) => Error::Config(m.clone()),
        Error::Io(e) => Error::Io(io::Error::new(e.kind(), e.to_string())),
    }
}
