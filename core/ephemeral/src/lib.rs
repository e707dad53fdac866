//! Bounded, time-evicting key-value store for short-lived process state.
//!
//! Values such as one-time download tokens only need to live for seconds or minutes.
//! The [`EphemeralStore`] keeps them in memory with:
//!
//! - A time to live after which entries are no longer returned.
//! - A maximum number of entries, evicting the entries closest to expiry to make room.
//!
//! Stores are cheap to clone and clones share the same entries.
//! All synchronisation happens inside the store: the lock is held only while
//! entries are checked or changed and never across an `await`.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use tokio::time::Instant;

/// Bounded, time-evicting key-value store.
pub struct EphemeralStore<V> {
    capacity: usize,
    entries: Arc<Mutex<HashMap<String, Entry<V>>>>,
    ttl: Duration,
}

impl<V> Clone for EphemeralStore<V> {
    fn clone(&self) -> Self {
        EphemeralStore {
            capacity: self.capacity,
            entries: Arc::clone(&self.entries),
            ttl: self.ttl,
        }
    }
}

struct Entry<V> {
    expires: Instant,
    value: V,
}

impl<V> EphemeralStore<V> {
    /// Create an empty store holding up to `capacity` entries for `ttl` each.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize, ttl: Duration) -> EphemeralStore<V> {
        EphemeralStore {
            capacity: capacity.max(1),
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Store a value, replacing any value already stored for the key.
    ///
    /// Expired entries are dropped first and, if the store is still full,
    /// the entry closest to expiry is evicted.
    pub fn insert<K: Into<String>>(&self, key: K, value: V) {
        let now = Instant::now();
        let key = key.into();
        let mut entries = self.access();
        entries.retain(|_, entry| entry.expires > now);
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        let entry = Entry {
            expires: now + self.ttl,
            value,
        };
        entries.insert(key, entry);
    }

    /// Number of entries in the store, including expired entries not yet purged.
    pub fn len(&self) -> usize {
        self.access().len()
    }

    /// Check if the store has no entries.
    pub fn is_empty(&self) -> bool {
        self.access().is_empty()
    }

    /// Drop all expired entries, returning how many were removed.
    pub fn purge(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.access();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires > now);
        before - entries.len()
    }

    /// Remove and return the value for a key, unless it has expired.
    ///
    /// A taken value is never returned again.
    pub fn take(&self, key: &str) -> Option<V> {
        let entry = self.access().remove(key)?;
        if entry.expires > Instant::now() {
            Some(entry.value)
        } else {
            None
        }
    }

    fn access(&self) -> MutexGuard<HashMap<String, Entry<V>>> {
        self.entries
            .lock()
            .expect("EphemeralStore entries lock poisoned")
    }
}

impl<V: Clone> EphemeralStore<V> {
    /// Return a copy of the value for a key without removing it, unless it has expired.
    pub fn peek(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        self.access()
            .get(key)
            .filter(|entry| entry.expires > now)
            .map(|entry| entry.value.clone())
    }
}
