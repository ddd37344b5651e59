//! Ephemeral result store
//!
//! Process-wide map from generated opaque id to a serialized preview result.
//! REPL previews land here so they can be fetched by a second request; a
//! preview is not addressable by (document, feature) alone. The store is
//! bounded: beyond `capacity` the oldest entries are evicted, and entries
//! past the optional TTL are purged on insertion, so a preview URL may
//! expire in a long-lived session.

use crate::context::TempResult;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Store statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempStoreStats {
    pub entries: usize,
    pub insertions: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Bounded, process-lifetime store of preview results
pub struct TempStore {
    storage: RwLock<HashMap<String, TempResult>>,
    capacity: usize,
    ttl: Option<Duration>,
    insertions: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl TempStore {
    /// Create a store holding at most `capacity` entries
    pub fn new(capacity: usize) -> Self {
        Self::with_ttl(capacity, None)
    }

    /// Create a store that also purges entries older than `ttl`
    pub fn with_ttl(capacity: usize, ttl: Option<Duration>) -> Self {
        TempStore {
            storage: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            insertions: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Insert a result under a fresh opaque id and return the id
    ///
    /// Id generation is random (UUID v4), so it is collision-free for the
    /// process lifetime and independent of timing. The result is visible to
    /// readers only once fully inserted.
    pub fn insert(&self, result: TempResult) -> String {
        let id = Uuid::new_v4().simple().to_string();
        let mut storage = self.storage.write().unwrap_or_else(|e| e.into_inner());

        self.purge_expired(&mut storage);
        while storage.len() >= self.capacity {
            self.evict_oldest(&mut storage);
        }

        storage.insert(id.clone(), result);
        self.insertions.fetch_add(1, Ordering::Relaxed);
        debug!(id = %id, entries = storage.len(), "stored preview result");
        id
    }

    /// Look up a result by id, cloning it out of the store
    pub fn get(&self, id: &str) -> Option<TempResult> {
        let storage = self.storage.read().unwrap_or_else(|e| e.into_inner());
        let result = storage.get(id).filter(|r| !self.expired(r)).cloned();
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    pub fn len(&self) -> usize {
        let storage = self.storage.read().unwrap_or_else(|e| e.into_inner());
        storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TempStoreStats {
        TempStoreStats {
            entries: self.len(),
            insertions: self.insertions.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn expired(&self, result: &TempResult) -> bool {
        match self.ttl {
            Some(ttl) => result
                .created_at
                .elapsed()
                .map(|age| age > ttl)
                .unwrap_or(false),
            None => false,
        }
    }

    fn purge_expired(&self, storage: &mut HashMap<String, TempResult>) {
        if self.ttl.is_none() {
            return;
        }
        let before = storage.len();
        storage.retain(|_, r| !self.expired(r));
        let removed = before - storage.len();
        if removed > 0 {
            self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "purged expired preview results");
        }
    }

    fn evict_oldest(&self, storage: &mut HashMap<String, TempResult>) {
        let oldest = storage
            .iter()
            .min_by_key(|(_, r)| r.created_at)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            storage.remove(&id);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(id = %id, "evicted oldest preview result");
        }
    }
}
