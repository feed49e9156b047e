use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use postroom::cache::{CacheConfig, KeyScheme, MemoryStore, ResponseCache};
use postroom::infra::http::middleware::REQUEST_ID_HEADER;
use postroom::infra::http::{Diagnostics, HttpState, build_router};
use postroom::infra::memory::InMemoryRepositories;

fn router(expose: bool) -> Router {
    let cache = ResponseCache::new(
        CacheConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(KeyScheme::default()),
    );
    let state = HttpState::assemble(Arc::new(InMemoryRepositories::new()), cache, 10);
    build_router(state, Diagnostics { expose })
}

async fn get(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_reports_the_active_storage() {
    let router = router(false);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, _, body) = get(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["storage"], "memory");
    assert_eq!(body["data"]["cache"], true);
}

#[tokio::test]
async fn inbound_request_id_is_echoed() {
    let router = router(false);
    let request = Request::builder()
        .uri("/api/posts")
        .header(REQUEST_ID_HEADER, "req-42")
        .body(Body::empty())
        .unwrap();

    let (_, headers, _) = get(&router, request).await;

    assert_eq!(headers.get(REQUEST_ID_HEADER).unwrap(), "req-42");
}

#[tokio::test]
async fn generated_request_id_is_a_uuid() {
    let router = router(false);
    let request = Request::builder().uri("/api/posts").body(Body::empty()).unwrap();

    let (_, headers, _) = get(&router, request).await;

    let id = headers.get(REQUEST_ID_HEADER).unwrap().to_str().unwrap();
    assert!(Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn diagnostics_only_appear_when_exposed() {
    let uri = format!("/api/posts/{}", Uuid::new_v4());

    let exposed = router(true);
    let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, _, body) = get(&exposed, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Post not found");
    assert!(body["diagnostics"]["chain"].is_array());

    let hidden = router(false);
    let request = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, _, body) = get(&hidden, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("diagnostics").is_none());
}
