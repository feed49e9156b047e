//! Postroom response cache.
//!
//! A read-through cache in front of the public read routes, kept consistent
//! by write-triggered invalidation:
//!
//! - **Store**: in-memory key/value entries with per-entry expiry
//! - **Keys**: request → key, and write → invalidation targets
//! - **Middleware**: serves hits, fills on misses
//! - **Trigger**: purges stale scopes after a committed write
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `postroom.toml`:
//!
//! ```toml
//! [cache]
//! enabled = true
//! listing_ttl_seconds = 300
//! trending_ttl_seconds = 600
//! # ... see config.rs for all options
//! ```

mod config;
mod keys;
mod lock;
mod middleware;
mod store;
mod trigger;

pub use config::CacheConfig;
pub use keys::{
    InvalidationTarget, KeyScheme, POSTS_LIST_SCOPE, POSTS_TRENDING_SCOPE, ResourceRef,
    canonical_query, post_comments_scope, post_detail_scope,
};
pub use middleware::{
    CACHE_STATUS_HEADER, CacheRouteExt, ResponseCache, RouteCache, response_cache_layer,
};
pub use store::{CacheError, CachedResponse, Epoch, MemoryStore, ResponseStore};
pub use trigger::{CacheTrigger, InvalidationOutcome};
