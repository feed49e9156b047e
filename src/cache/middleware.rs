//! Read-through response cache middleware.
//!
//! Wraps individual GET routes. A hit is answered from the store without
//! running the handler; a miss runs the handler and stores a `200 OK` body
//! under the route's TTL.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Method, Request, StatusCode, header},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use http_body_util::BodyExt;
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::application::error::ErrorReport;

use super::{
    CacheConfig,
    keys::KeyScheme,
    store::{CachedResponse, ResponseStore},
};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

const METRIC_CACHE_HIT: &str = "postroom_cache_hit_total";
const METRIC_CACHE_MISS: &str = "postroom_cache_miss_total";
const METRIC_CACHE_FILL_SKIPPED: &str = "postroom_cache_fill_skipped_total";

/// Process-wide response cache handle.
///
/// Built once at startup and shared by every cached route.
#[derive(Clone)]
pub struct ResponseCache {
    config: CacheConfig,
    store: Arc<dyn ResponseStore>,
    keys: Arc<KeyScheme>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, store: Arc<dyn ResponseStore>, keys: Arc<KeyScheme>) -> Self {
        Self {
            config,
            store,
            keys,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ResponseStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<KeyScheme> {
        &self.keys
    }

    /// State for one cached route.
    pub fn for_route(&self, ttl: Duration) -> RouteCache {
        RouteCache {
            cache: self.clone(),
            ttl,
        }
    }
}

/// Middleware state: the shared cache plus the route's TTL.
#[derive(Clone)]
pub struct RouteCache {
    cache: ResponseCache,
    ttl: Duration,
}

/// Attaches the read-through cache in front of a route.
pub trait CacheRouteExt {
    /// Caches the route's GET responses for `ttl`. No-op when the cache is
    /// disabled.
    fn cached(self, cache: &ResponseCache, ttl: Duration) -> Self;
}

impl<S> CacheRouteExt for MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn cached(self, cache: &ResponseCache, ttl: Duration) -> Self {
        if !cache.config.enabled {
            return self;
        }
        self.route_layer(axum_middleware::from_fn_with_state(
            cache.for_route(ttl),
            response_cache_layer,
        ))
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(route): State<RouteCache>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let cache = &route.cache;
    let key = cache
        .keys
        .key_for_read(request.method(), request.uri().path(), request.uri().query());

    match cache.store.get(&key) {
        Ok(Some(cached)) => {
            counter!(METRIC_CACHE_HIT).increment(1);
            debug!(cache = "response", outcome = "hit", %key, "serving cached response");
            return build_response(cached);
        }
        Ok(None) => {
            counter!(METRIC_CACHE_MISS).increment(1);
            debug!(cache = "response", outcome = "miss", %key, "cache miss, executing handler");
        }
        Err(err) => {
            counter!(METRIC_CACHE_MISS).increment(1);
            warn!(
                cache = "response",
                outcome = "lookup_failed",
                %key,
                error = %err,
                "cache lookup failed, serving a fresh response"
            );
        }
    }

    // Captured before the handler reads anything, so a write that commits
    // while we run fences our fill.
    let epoch = match cache.store.epoch() {
        Ok(epoch) => Some(epoch),
        Err(err) => {
            warn!(cache = "response", %key, error = %err, "cache epoch unavailable, fill disabled");
            None
        }
    };

    let response = next.run(request).await;
    if !should_store_response(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match BodyExt::collect(body).await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_message(
                "cache::middleware",
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                format!("failed to buffer response body: {err}"),
            )
            .attach(&mut response);
            return response;
        }
    };

    if let Some(epoch) = epoch {
        if bytes.len() > cache.config.max_body_bytes {
            debug!(cache = "response", %key, size = bytes.len(), "response too large to cache");
        } else {
            let cached = CachedResponse {
                status: parts.status.as_u16(),
                content_type: parts
                    .headers
                    .get(header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string),
                body: bytes.clone(),
            };
            match cache.store.set_if_current(&key, cached, route.ttl, epoch) {
                Ok(true) => {
                    debug!(cache = "response", %key, ttl_secs = route.ttl.as_secs(), "caching response");
                }
                Ok(false) => {
                    counter!(METRIC_CACHE_FILL_SKIPPED).increment(1);
                    debug!(cache = "response", %key, "invalidated while filling, not caching");
                }
                Err(err) => {
                    warn!(cache = "response", %key, error = %err, "failed to store response");
                }
            }
        }
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn should_store_response(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }

    if response.headers().contains_key(header::SET_COOKIE) {
        return false;
    }

    !response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/event-stream"))
}

fn build_response(cached: CachedResponse) -> Response {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Some(content_type) = cached
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
    {
        headers.insert(header::CONTENT_TYPE, content_type);
    }
    headers.insert(CACHE_STATUS_HEADER, HeaderValue::from_static("HIT"));
    response
}
