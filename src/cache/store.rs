//! Cache storage.
//!
//! `ResponseStore` is the seam between the HTTP cache layer and whatever
//! holds the bytes; `MemoryStore` is the process-local implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::time::Instant;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

/// Longest lifetime an entry can get; larger TTLs are clamped to it.
const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Monotonic invalidation counter.
///
/// Every delete bumps the epoch, so a fill that captured an older epoch
/// knows an invalidation raced with it.
pub type Epoch = u64;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Opaque cached payload. The store never looks inside `body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Key/value storage with per-entry expiration.
///
/// All operations are non-suspending. Implementations must make
/// `delete_matching` final: once a key is chosen for deletion no entry may
/// remain under it until the next explicit `set`.
pub trait ResponseStore: Send + Sync {
    /// Returns `None` for keys that were never set, were deleted, or expired.
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    /// Inserts or replaces the entry, expiring `ttl` from now.
    fn set(&self, key: &str, value: CachedResponse, ttl: Duration) -> Result<(), CacheError>;

    /// Like `set`, but only if no invalidation happened since `epoch`.
    ///
    /// Returns whether the entry was stored.
    fn set_if_current(
        &self,
        key: &str,
        value: CachedResponse,
        ttl: Duration,
        epoch: Epoch,
    ) -> Result<bool, CacheError>;

    /// Removes one entry. Absent keys are not an error.
    fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Removes every entry whose key satisfies `matcher`, returning the count.
    fn delete_matching(&self, matcher: &dyn Fn(&str) -> bool) -> Result<usize, CacheError>;

    /// Current invalidation epoch.
    fn epoch(&self) -> Result<Epoch, CacheError>;
}

struct CacheEntry {
    value: CachedResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: CachedResponse, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            expires_at: now.checked_add(ttl.min(MAX_ENTRY_LIFETIME)).unwrap_or(now),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    epoch: Epoch,
}

/// In-process response store guarded by a single `RwLock`.
///
/// There is no capacity bound; entries leave only through expiry or
/// invalidation.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Entries>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet dropped.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = rw_read(&self.entries, SOURCE, "keys")
            .map
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut guard = rw_write(&self.entries, SOURCE, "purge_expired");
        let before = guard.map.len();
        guard.map.retain(|_, entry| entry.is_live(now));
        before - guard.map.len()
    }
}

impl ResponseStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let now = Instant::now();
        {
            let guard = rw_read(&self.entries, SOURCE, "get");
            match guard.map.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: drop it, unless a concurrent `set` already replaced it.
        let mut guard = rw_write(&self.entries, SOURCE, "get.expire");
        if guard.map.get(key).is_some_and(|entry| !entry.is_live(now)) {
            guard.map.remove(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: CachedResponse, ttl: Duration) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value, ttl);
        rw_write(&self.entries, SOURCE, "set")
            .map
            .insert(key.to_string(), entry);
        Ok(())
    }

    fn set_if_current(
        &self,
        key: &str,
        value: CachedResponse,
        ttl: Duration,
        epoch: Epoch,
    ) -> Result<bool, CacheError> {
        let entry = CacheEntry::new(value, ttl);
        let mut guard = rw_write(&self.entries, SOURCE, "set_if_current");
        if guard.epoch != epoch {
            return Ok(false);
        }
        guard.map.insert(key.to_string(), entry);
        Ok(true)
    }

    fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut guard = rw_write(&self.entries, SOURCE, "delete");
        guard.epoch += 1;
        Ok(guard.map.remove(key).is_some())
    }

    fn delete_matching(&self, matcher: &dyn Fn(&str) -> bool) -> Result<usize, CacheError> {
        let mut guard = rw_write(&self.entries, SOURCE, "delete_matching");
        guard.epoch += 1;
        let before = guard.map.len();
        guard.map.retain(|key, _| !matcher(key));
        Ok(before - guard.map.len())
    }

    fn epoch(&self) -> Result<Epoch, CacheError> {
        Ok(rw_read(&self.entries, SOURCE, "epoch").epoch)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    use super::*;

    fn payload(body: &'static str) -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[test]
    fn get_returns_what_was_set() {
        let store = MemoryStore::new();
        assert!(store.get("a").unwrap().is_none());

        store.set("a", payload("one"), Duration::from_secs(60)).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(payload("one")));
    }

    #[test]
    fn set_replaces_whole_entry() {
        let store = MemoryStore::new();
        store.set("a", payload("one"), Duration::from_secs(60)).unwrap();
        store.set("a", payload("two"), Duration::from_secs(60)).unwrap();

        assert_eq!(store.get("a").unwrap(), Some(payload("two")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_is_final_and_idempotent() {
        let store = MemoryStore::new();
        store.set("a", payload("one"), Duration::from_secs(60)).unwrap();

        assert!(store.delete("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
        assert!(!store.delete("a").unwrap());
        assert!(!store.delete("never-set").unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryStore::new();
        store.set("a", payload("one"), Duration::from_secs(300)).unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert!(store.get("a").unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("a").unwrap().is_none());
        // The stale entry is dropped on lookup.
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_keeps_live_entries() {
        let store = MemoryStore::new();
        store.set("short", payload("s"), Duration::from_secs(10)).unwrap();
        store.set("long", payload("l"), Duration::from_secs(100)).unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.keys(), vec!["long".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_ttl_is_clamped_instead_of_overflowing() {
        let store = MemoryStore::new();
        store.set("a", payload("one"), Duration::MAX).unwrap();
        let epoch = store.epoch().unwrap();
        assert!(
            store
                .set_if_current("b", payload("two"), Duration::from_secs(u64::MAX), epoch)
                .unwrap()
        );

        tokio::time::advance(Duration::from_secs(10 * 365 * 24 * 60 * 60)).await;
        assert_eq!(store.get("a").unwrap(), Some(payload("one")));
        assert_eq!(store.get("b").unwrap(), Some(payload("two")));
    }

    #[test]
    fn delete_matching_removes_only_matches() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.set("post:1:detail|x", payload("1"), ttl).unwrap();
        store.set("post:1:comments|y", payload("2"), ttl).unwrap();
        store.set("post:12:detail|z", payload("3"), ttl).unwrap();

        let removed = store
            .delete_matching(&|key| key.starts_with("post:1:"))
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.keys(), vec!["post:12:detail|z".to_string()]);
    }

    #[test]
    fn set_if_current_rejects_fills_older_than_an_invalidation() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        let epoch = store.epoch().unwrap();
        store.delete_matching(&|_| true).unwrap();

        assert!(!store.set_if_current("a", payload("stale"), ttl, epoch).unwrap());
        assert!(store.get("a").unwrap().is_none());

        let fresh = store.epoch().unwrap();
        assert!(store.set_if_current("a", payload("fresh"), ttl, fresh).unwrap());
        assert_eq!(store.get("a").unwrap(), Some(payload("fresh")));
    }

    #[test]
    fn concurrent_access_keeps_store_consistent() {
        let store = Arc::new(MemoryStore::new());
        let ttl = Duration::from_secs(60);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let key = format!("w{worker}:{i}");
                        store.set(&key, payload("v"), ttl).unwrap();
                        let _ = store.get(&key).unwrap();
                        if i % 10 == 0 {
                            store
                                .delete_matching(&|k| k.starts_with(&format!("w{worker}:")))
                                .unwrap();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker thread");
        }

        for key in store.keys() {
            assert!(store.get(&key).unwrap().is_some());
        }
    }

    #[test]
    fn store_recovers_from_poisoned_lock() {
        let store = MemoryStore::new();

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        store.set("a", payload("one"), Duration::from_secs(60)).unwrap();
        assert!(store.get("a").unwrap().is_some());
    }
}
