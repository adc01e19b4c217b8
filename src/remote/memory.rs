// src/remote/memory.rs
//! In-process remote store
//!
//! Behaves like a bucket (sorted keys, paginated listing) and counts every
//! operation so callers can assert how much remote traffic a code path made.
//! Individual keys, or the whole store, can be made to fail.

use crate::error::{Error, Result};
use crate::remote::{KeyStream, RemoteStore, content_type_for};
use async_stream::try_stream;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// Snapshot of operation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpCounts {
    /// List pages fetched
    pub list_pages: usize,
    pub gets: usize,
    pub puts: usize,
}

impl OpCounts {
    pub fn total(&self) -> usize {
        self.list_pages + self.gets + self.puts
    }
}

/// Remote store held entirely in memory
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    failing_keys: RwLock<HashSet<String>>,
    unavailable: AtomicBool,
    page_size: usize,
    list_pages: AtomicUsize,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Create a store whose listings return at most `page_size` keys per page
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            failing_keys: RwLock::new(HashSet::new()),
            unavailable: AtomicBool::new(false),
            page_size: page_size.max(1),
            list_pages: AtomicUsize::new(0),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    /// Seed an object without counting it as a put
    pub fn insert(&self, key: &str, data: impl Into<Vec<u8>>) {
        let content_type = content_type_for(key);
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                content_type,
            },
        );
    }

    /// Read an object without counting it as a get
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.read().get(key).map(|o| o.data.clone())
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects.read().get(key).map(|o| o.content_type.clone())
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Make every subsequent get or put of `key` fail as unavailable
    pub fn fail_key(&self, key: &str) {
        self.failing_keys.write().insert(key.to_string());
    }

    /// Undo every [`MemoryStore::fail_key`]
    pub fn clear_failures(&self) {
        self.failing_keys.write().clear();
    }

    /// Make every operation fail as unavailable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn op_counts(&self) -> OpCounts {
        OpCounts {
            list_pages: self.list_pages.load(Ordering::SeqCst),
            gets: self.gets.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
        }
    }

    fn check_available(&self, key: &str) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::RemoteUnavailable(format!("{key}: store offline")));
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<()> {
        self.check_available(key)?;
        if self.failing_keys.read().contains(key) {
            return Err(Error::RemoteUnavailable(format!("{key}: injected failure")));
        }
        Ok(())
    }

    /// One page of keys under `prefix` strictly after `after`
    fn page(&self, prefix: &str, after: Option<&str>) -> Vec<String> {
        let objects = self.objects.read();
        let lower = match after {
            Some(key) => Bound::Excluded(key.to_string()),
            None => Bound::Included(prefix.to_string()),
        };
        objects
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .take_while(|key| key.starts_with(prefix))
            .take(self.page_size)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        Box::pin(try_stream! {
            let mut after: Option<String> = None;
            loop {
                self.check_available(prefix)?;
                self.list_pages.fetch_add(1, Ordering::SeqCst);

                let page = self.page(prefix, after.as_deref());
                let full = page.len() == self.page_size;
                after = page.last().cloned();

                for key in page {
                    yield key;
                }

                if !full {
                    break;
                }
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_key(key)?;
        self.object(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.check_key(key)?;
        self.objects.write().insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::list_all;

    #[tokio::test]
    async fn test_paginated_listing() {
        let store = MemoryStore::with_page_size(2);
        for i in 0..5 {
            store.insert(&format!("games/a/{i}.js"), b"x".to_vec());
        }
        store.insert("games/b/index.html", b"x".to_vec());
        store.insert("misc-files/z.png", b"x".to_vec());

        let keys = list_all(&store, "games/a/").await.unwrap();
        assert_eq!(keys.len(), 5);
        assert_eq!(store.op_counts().list_pages, 3);

        // Restartable: a second listing starts over
        let again = list_all(&store, "games/a/").await.unwrap();
        assert_eq!(keys, again);
    }

    #[tokio::test]
    async fn test_get_put_and_not_found() {
        let store = MemoryStore::new();
        store.put("games/a/index.html", b"<html>".to_vec(), "text/html").await.unwrap();

        assert_eq!(store.get("games/a/index.html").await.unwrap(), b"<html>");
        assert_eq!(store.content_type("games/a/index.html").unwrap(), "text/html");
        assert!(matches!(
            store.get("games/a/missing").await,
            Err(Error::NotFound(_))
        ));
        assert_eq!(store.op_counts(), OpCounts { list_pages: 0, gets: 2, puts: 1 });
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.insert("games/a/index.html", b"x".to_vec());
        store.fail_key("games/a/index.html");
        assert!(matches!(
            store.get("games/a/index.html").await,
            Err(Error::RemoteUnavailable(_))
        ));

        store.set_unavailable(true);
        assert!(list_all(&store, "games/").await.is_err());
    }
}
