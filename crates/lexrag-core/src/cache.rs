//! Bounded in-memory cache of query embeddings.
//!
//! Keys are normalized query texts (see [`normalize_key`]); values are the
//! vectors the provider returned for them. When the cache is full the
//! oldest *inserted* entry is evicted. Reads do not refresh an entry's
//! position and re-inserting an existing key overwrites the vector in place
//! without moving it.
//!
//! The cache is shared between concurrent retrievals, so all state sits
//! behind a single mutex. A capacity of `0` disables caching entirely.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde::Serialize;

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    /// `size / capacity`, or `0.0` for a disabled cache.
    pub utilization: f64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

/// FIFO-bounded map from normalized query text to embedding vector.
pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

/// Canonical cache key: lower-cased, trimmed, every whitespace run
/// (newlines included) collapsed to a single space.
pub fn normalize_key(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning is harmless here: both maps are updated together.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up the vector cached for `text`.
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        if self.capacity == 0 {
            return None;
        }
        self.lock().entries.get(&normalize_key(text)).cloned()
    }

    /// Store `vector` under `text`, evicting the oldest entry when full.
    pub fn put(&self, text: &str, vector: Vec<f32>) {
        if self.capacity == 0 {
            return;
        }
        let key = normalize_key(text);
        let mut inner = self.lock();

        if let Some(existing) = inner.entries.get_mut(&key) {
            *existing = vector;
            return;
        }

        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, vector);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        let utilization = if self.capacity == 0 {
            0.0
        } else {
            size as f64 / self.capacity as f64
        };
        CacheStats {
            size,
            capacity: self.capacity,
            utilization,
        }
    }
}
