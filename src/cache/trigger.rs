//! Cache trigger service.
//!
//! Write paths call the trigger after their change has committed. The
//! trigger resolves the touched resources to invalidation targets and
//! purges them synchronously, so the write's response is only returned once
//! stale reads are gone.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, error};
use uuid::Uuid;

use super::keys::{InvalidationTarget, KeyScheme, ResourceRef};
use super::store::ResponseStore;

const METRIC_CACHE_INVALIDATED: &str = "postroom_cache_invalidated_total";
const METRIC_CACHE_INVALIDATION_FAILED: &str = "postroom_cache_invalidation_failed_total";

/// Result of one invalidation pass.
///
/// A degraded pass never fails the write that triggered it; stale entries
/// then live until their TTL runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// The response cache is disabled; nothing to purge.
    Disabled,
    /// Every target was purged.
    Applied { removed: usize },
    /// Some targets could not be purged.
    Degraded {
        removed: usize,
        failed: Vec<InvalidationTarget>,
    },
}

impl InvalidationOutcome {
    pub fn removed(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Applied { removed } | Self::Degraded { removed, .. } => *removed,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Invalidation entry point for write handlers.
pub struct CacheTrigger {
    enabled: bool,
    store: Arc<dyn ResponseStore>,
    keys: Arc<KeyScheme>,
}

impl CacheTrigger {
    pub fn new(enabled: bool, store: Arc<dyn ResponseStore>, keys: Arc<KeyScheme>) -> Self {
        Self {
            enabled,
            store,
            keys,
        }
    }

    /// Purges everything the given resources make stale.
    ///
    /// Safe to repeat: a second call finds nothing left to remove.
    pub fn invalidate(&self, resources: &[ResourceRef]) -> InvalidationOutcome {
        if !self.enabled {
            debug!(resources = resources.len(), "Cache trigger skipped: cache disabled");
            return InvalidationOutcome::Disabled;
        }

        let mut targets: Vec<InvalidationTarget> = Vec::new();
        for resource in resources {
            for target in self.keys.invalidation_targets(resource) {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }

        let mut removed = 0;
        let mut failed = Vec::new();
        for target in targets {
            match self.store.delete_matching(&|key| target.matches(key)) {
                Ok(count) => {
                    removed += count;
                    debug!(%target, removed = count, "Cache target invalidated");
                }
                Err(err) => {
                    counter!(METRIC_CACHE_INVALIDATION_FAILED).increment(1);
                    error!(
                        %target,
                        error = %err,
                        "Cache invalidation failed; entries stay stale until their TTL expires"
                    );
                    failed.push(target);
                }
            }
        }

        counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);

        if failed.is_empty() {
            InvalidationOutcome::Applied { removed }
        } else {
            InvalidationOutcome::Degraded { removed, failed }
        }
    }

    /// A post was created, updated or deleted.
    pub fn post_changed(&self, post_id: Uuid) -> InvalidationOutcome {
        self.invalidate(&[ResourceRef::post(post_id)])
    }

    /// A comment of `post_id` was created, updated or deleted.
    pub fn comment_changed(&self, comment_id: Uuid, post_id: Uuid) -> InvalidationOutcome {
        self.invalidate(&[ResourceRef::comment(comment_id, post_id)])
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Method;
    use bytes::Bytes;

    use super::*;
    use crate::cache::store::{CacheError, CachedResponse, Epoch, MemoryStore};

    fn payload() -> CachedResponse {
        CachedResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: Bytes::from_static(b"{}"),
        }
    }

    fn seed(store: &MemoryStore, keys: &KeyScheme, path: &str, query: Option<&str>) -> String {
        let key = keys.key_for_read(&Method::GET, path, query);
        store.set(&key, payload(), Duration::from_secs(300)).unwrap();
        key
    }

    fn trigger_over(store: Arc<MemoryStore>) -> CacheTrigger {
        CacheTrigger::new(true, store, Arc::new(KeyScheme::default()))
    }

    #[test]
    fn comment_change_purges_owning_post_only() {
        let store = Arc::new(MemoryStore::new());
        let trigger = trigger_over(store.clone());
        let keys = KeyScheme::default();

        let post = Uuid::new_v4();
        let other = Uuid::new_v4();
        let detail = seed(&store, &keys, &format!("/api/posts/{post}"), None);
        let comments = seed(
            &store,
            &keys,
            &format!("/api/posts/{post}/comments"),
            Some("page=1&limit=20"),
        );
        let comments_page_two = seed(
            &store,
            &keys,
            &format!("/api/posts/{post}/comments"),
            Some("page=2"),
        );
        let other_detail = seed(&store, &keys, &format!("/api/posts/{other}"), None);
        let other_comments = seed(&store, &keys, &format!("/api/posts/{other}/comments"), None);

        let outcome = trigger.comment_changed(Uuid::new_v4(), post);

        assert_eq!(outcome, InvalidationOutcome::Applied { removed: 3 });
        assert!(store.get(&detail).unwrap().is_none());
        assert!(store.get(&comments).unwrap().is_none());
        assert!(store.get(&comments_page_two).unwrap().is_none());
        assert!(store.get(&other_detail).unwrap().is_some());
        assert!(store.get(&other_comments).unwrap().is_some());
    }

    #[test]
    fn post_change_purges_listings() {
        let store = Arc::new(MemoryStore::new());
        let trigger = trigger_over(store.clone());
        let keys = KeyScheme::default();

        let listing = seed(&store, &keys, "/api/posts", Some("page=3"));
        let trending = seed(&store, &keys, "/api/posts/trending", None);

        let outcome = trigger.post_changed(Uuid::new_v4());

        assert_eq!(outcome.removed(), 2);
        assert!(store.get(&listing).unwrap().is_none());
        assert!(store.get(&trending).unwrap().is_none());
    }

    #[test]
    fn invalidation_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let trigger = trigger_over(store.clone());
        let keys = KeyScheme::default();
        let post = Uuid::new_v4();
        seed(&store, &keys, &format!("/api/posts/{post}"), None);

        let refs = [ResourceRef::comment(Uuid::new_v4(), post)];
        assert_eq!(trigger.invalidate(&refs).removed(), 1);
        assert_eq!(trigger.invalidate(&refs), InvalidationOutcome::Applied { removed: 0 });
    }

    #[test]
    fn overlapping_resources_are_purged_once() {
        let store = Arc::new(MemoryStore::new());
        let trigger = trigger_over(store.clone());
        let post = Uuid::new_v4();
        let parent = Uuid::new_v4();
        let reply = Uuid::new_v4();

        let epoch_before = store.epoch().unwrap();
        trigger.invalidate(&[
            ResourceRef::comment(parent, post),
            ResourceRef::comment(reply, post),
        ]);
        // detail, comments and trending scopes, once each.
        assert_eq!(store.epoch().unwrap(), epoch_before + 3);
    }

    #[test]
    fn disabled_trigger_does_nothing() {
        let store = Arc::new(MemoryStore::new());
        let trigger = CacheTrigger::new(false, store.clone(), Arc::new(KeyScheme::default()));
        let keys = KeyScheme::default();
        let post = Uuid::new_v4();
        let key = seed(&store, &keys, &format!("/api/posts/{post}"), None);

        assert_eq!(trigger.post_changed(post), InvalidationOutcome::Disabled);
        assert!(store.get(&key).unwrap().is_some());
    }

    struct BrokenStore;

    impl ResponseStore for BrokenStore {
        fn get(&self, _: &str) -> Result<Option<CachedResponse>, CacheError> {
            Ok(None)
        }

        fn set(&self, _: &str, _: CachedResponse, _: Duration) -> Result<(), CacheError> {
            Ok(())
        }

        fn set_if_current(
            &self,
            _: &str,
            _: CachedResponse,
            _: Duration,
            _: Epoch,
        ) -> Result<bool, CacheError> {
            Ok(true)
        }

        fn delete(&self, _: &str) -> Result<bool, CacheError> {
            Err(CacheError::unavailable("store is down"))
        }

        fn delete_matching(&self, _: &dyn Fn(&str) -> bool) -> Result<usize, CacheError> {
            Err(CacheError::unavailable("store is down"))
        }

        fn epoch(&self) -> Result<Epoch, CacheError> {
            Ok(0)
        }
    }

    #[test]
    fn store_failures_degrade_instead_of_failing() {
        let trigger = CacheTrigger::new(true, Arc::new(BrokenStore), Arc::new(KeyScheme::default()));
        let post = Uuid::new_v4();

        let outcome = trigger.comment_changed(Uuid::new_v4(), post);

        assert!(outcome.is_degraded());
        match outcome {
            InvalidationOutcome::Degraded { removed, failed } => {
                assert_eq!(removed, 0);
                assert_eq!(failed.len(), 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
