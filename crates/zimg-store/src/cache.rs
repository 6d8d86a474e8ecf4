//! The hot cache: a bounded, process-wide map from rendition key to encoded
//! image bytes.
//!
//! Blobs are opaque to the cache; coherence comes from the keys themselves.
//! Origin bytes are immutable under their fingerprint, so entries never go
//! stale, and only corrupt blobs are ever evicted by callers.

use bytes::Bytes;
use lru::LruCache;
use std::sync::Mutex;

pub struct HotCache {
    inner: Mutex<Inner>,
    max_entry_size: usize,
    max_total_size: usize,
}

struct Inner {
    map: LruCache<String, Bytes>,
    total: usize,
}

impl HotCache {
    /// `max_entry_size` is the per-blob bound: anything at least that large
    /// is never inserted. `max_total_size` bounds the sum of all blobs;
    /// least-recently-used entries are dropped to stay under it.
    pub fn new(max_entry_size: usize, max_total_size: usize) -> Self {
        HotCache {
            inner: Mutex::new(Inner {
                map: LruCache::unbounded(),
                total: 0,
            }),
            max_entry_size,
            max_total_size,
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().map.get(key).cloned()
    }

    pub fn put(&self, key: &str, blob: Bytes) {
        if blob.len() >= self.max_entry_size {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.map.pop(key) {
            inner.total -= old.len();
        }
        while inner.total + blob.len() > self.max_total_size {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.total -= evicted.len(),
                None => break,
            }
        }
        inner.total += blob.len();
        inner.map.put(key.to_owned(), blob);
    }

    pub fn delete(&self, key: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(old) = inner.map.pop(key) {
            inner.total -= old.len();
        }
    }

    /// Presence check without promoting the entry.
    pub fn exists(&self, key: &str) -> bool {
        self.inner.lock().unwrap().map.contains(key)
    }
}
