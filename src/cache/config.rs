//! Cache configuration.
//!
//! Controls the response cache and the per-route TTLs via `postroom.toml`.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_LISTING_TTL_SECS: u64 = 300;
const DEFAULT_TRENDING_TTL_SECS: u64 = 600;
const DEFAULT_DETAIL_TTL_SECS: u64 = 300;
const DEFAULT_COMMENTS_TTL_SECS: u64 = 300;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Response cache configuration from `postroom.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable the read-through response cache.
    pub enabled: bool,
    /// TTL (seconds) for the general post listing.
    pub listing_ttl_secs: u64,
    /// TTL (seconds) for the trending listing.
    pub trending_ttl_secs: u64,
    /// TTL (seconds) for a single post's detail read.
    pub detail_ttl_secs: u64,
    /// TTL (seconds) for a post's comment tree.
    pub comments_ttl_secs: u64,
    /// Responses with larger bodies are served but never stored.
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listing_ttl_secs: DEFAULT_LISTING_TTL_SECS,
            trending_ttl_secs: DEFAULT_TRENDING_TTL_SECS,
            detail_ttl_secs: DEFAULT_DETAIL_TTL_SECS,
            comments_ttl_secs: DEFAULT_COMMENTS_TTL_SECS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            listing_ttl_secs: settings.listing_ttl.as_secs(),
            trending_ttl_secs: settings.trending_ttl.as_secs(),
            detail_ttl_secs: settings.detail_ttl.as_secs(),
            comments_ttl_secs: settings.comments_ttl.as_secs(),
            max_body_bytes: settings.max_body_bytes.get(),
        }
    }
}

impl CacheConfig {
    pub fn listing_ttl(&self) -> Duration {
        Duration::from_secs(self.listing_ttl_secs)
    }

    pub fn trending_ttl(&self) -> Duration {
        Duration::from_secs(self.trending_ttl_secs)
    }

    pub fn detail_ttl(&self) -> Duration {
        Duration::from_secs(self.detail_ttl_secs)
    }

    pub fn comments_ttl(&self) -> Duration {
        Duration::from_secs(self.comments_ttl_secs)
    }
}
