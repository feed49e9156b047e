pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod state;

pub use middleware::Diagnostics;
pub use state::HttpState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, patch},
};

use crate::cache::CacheRouteExt;

use middleware::{expose_error_diagnostics, log_responses, set_request_context};

/// Builds the public router.
///
/// Read routes sit behind the response cache with their configured TTLs;
/// write routes invalidate through the services' cache trigger.
pub fn build_router(state: HttpState, diagnostics: Diagnostics) -> Router {
    let cache = state.cache.clone();
    let ttl = cache.config().clone();

    Router::new()
        .route(
            "/api/posts",
            get(handlers::list_posts)
                .cached(&cache, ttl.listing_ttl())
                .post(handlers::create_post),
        )
        .route(
            "/api/posts/trending",
            get(handlers::trending_posts).cached(&cache, ttl.trending_ttl()),
        )
        .route(
            "/api/posts/{id}",
            get(handlers::get_post)
                .cached(&cache, ttl.detail_ttl())
                .patch(handlers::update_post)
                .delete(handlers::delete_post),
        )
        .route(
            "/api/posts/{id}/comments",
            get(handlers::list_comments)
                .cached(&cache, ttl.comments_ttl())
                .post(handlers::create_comment),
        )
        .route(
            "/api/comments/{id}",
            patch(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            diagnostics,
            expose_error_diagnostics,
        ))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
