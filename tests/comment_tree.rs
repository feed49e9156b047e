//! Comment listing shape and the write rules around it.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::{Duration, OffsetDateTime};
use tower::ServiceExt;
use uuid::Uuid;

use postroom::cache::{CacheConfig, KeyScheme, MemoryStore, ResponseCache};
use postroom::domain::entities::{CommentRecord, PostRecord};
use postroom::infra::http::{Diagnostics, HttpState, build_router};
use postroom::infra::memory::InMemoryRepositories;

fn app() -> (Router, Arc<InMemoryRepositories>) {
    let repos = Arc::new(InMemoryRepositories::new());
    let cache = ResponseCache::new(
        CacheConfig::default(),
        Arc::new(MemoryStore::new()),
        Arc::new(KeyScheme::default()),
    );
    let state = HttpState::assemble(repos.clone(), cache, 10);
    (build_router(state, Diagnostics { expose: false }), repos)
}

fn seed_post(repos: &InMemoryRepositories, author: Uuid, is_deleted: bool) -> Uuid {
    let now = OffsetDateTime::now_utc();
    let id = Uuid::new_v4();
    repos.insert_post(PostRecord {
        id,
        author_id: author,
        title: "seeded".to_string(),
        content: "body".to_string(),
        is_deleted,
        created_at: now,
        updated_at: now,
    });
    id
}

fn seed_comment(
    repos: &InMemoryRepositories,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    content: &str,
    minutes: i64,
) -> Uuid {
    let base = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
    let id = Uuid::new_v4();
    repos.insert_comment(CommentRecord {
        id,
        post_id,
        author_id: Uuid::new_v4(),
        parent_id,
        content: content.to_string(),
        is_edited: false,
        edited_at: None,
        created_at: base + Duration::minutes(minutes),
    });
    id
}

async fn send(
    router: &Router,
    method: Method,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn contents(items: &Value) -> Vec<String> {
    items
        .as_array()
        .unwrap()
        .iter()
        .map(|item| item["content"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn top_level_newest_first_with_replies_oldest_first() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);
    let t1 = seed_comment(&repos, post, None, "T1", 0);
    seed_comment(&repos, post, None, "T2", 1);
    seed_comment(&repos, post, None, "T3", 2);
    seed_comment(&repos, post, Some(t1), "R2", 4);
    seed_comment(&repos, post, Some(t1), "R1", 3);

    let (status, body) = send(
        &router,
        Method::GET,
        &format!("/api/posts/{post}/comments?page=1&limit=20"),
        &[],
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(contents(&body["data"]), ["T3", "T2", "T1"]);
    assert_eq!(contents(&body["data"][2]["replies"]), ["R1", "R2"]);
    assert_eq!(body["data"][0]["replies"], json!([]));
    assert_eq!(
        body["pagination"],
        json!({ "total": 3, "page": 1, "limit": 20, "pages": 1 })
    );
}

#[tokio::test]
async fn pages_split_top_level_comments_only() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);
    let mut first = None;
    for minute in 0..5 {
        let id = seed_comment(&repos, post, None, &format!("T{minute}"), minute);
        first.get_or_insert(id);
    }
    for minute in 10..13 {
        seed_comment(&repos, post, first, "reply", minute);
    }

    let (_, body) = send(
        &router,
        Method::GET,
        &format!("/api/posts/{post}/comments?page=3&limit=2"),
        &[],
        None,
    )
    .await;

    assert_eq!(contents(&body["data"]), ["T0"]);
    assert_eq!(body["data"][0]["replies"].as_array().unwrap().len(), 3);
    assert_eq!(body["pagination"]["total"], 5);
    assert_eq!(body["pagination"]["pages"], 3);
}

#[tokio::test]
async fn comments_of_deleted_or_missing_posts_are_not_found() {
    let (router, repos) = app();
    let deleted = seed_post(&repos, Uuid::new_v4(), true);

    for post in [deleted, Uuid::new_v4()] {
        let (status, body) = send(
            &router,
            Method::GET,
            &format!("/api/posts/{post}/comments"),
            &[],
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }
}

#[tokio::test]
async fn reply_parent_must_belong_to_the_same_post() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);
    let other = seed_post(&repos, Uuid::new_v4(), false);
    let foreign_parent = seed_comment(&repos, other, None, "elsewhere", 0);
    let user = Uuid::new_v4().to_string();

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/api/posts/{post}/comments"),
        &[("x-user-id", &user)],
        Some(json!({ "content": "reply", "parent_id": foreign_parent })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn only_author_or_admin_may_modify_a_comment() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);
    let author = Uuid::new_v4().to_string();

    let (status, created) = send(
        &router,
        Method::POST,
        &format!("/api/posts/{post}/comments"),
        &[("x-user-id", &author)],
        Some(json!({ "content": "mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let comment = created["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/comments/{comment}");

    let stranger = Uuid::new_v4().to_string();
    let (status, _) = send(
        &router,
        Method::PATCH,
        &uri,
        &[("x-user-id", &stranger)],
        Some(json!({ "content": "not yours" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &router,
        Method::PATCH,
        &uri,
        &[("x-user-id", &stranger), ("x-user-role", "admin")],
        Some(json!({ "content": "moderated" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_edited"], true);
    assert!(body["data"]["edited_at"].is_string());

    let (status, _) = send(&router, Method::DELETE, &uri, &[("x-user-id", &author)], None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn writes_require_an_identity() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);

    let (status, body) = send(
        &router,
        Method::POST,
        &format!("/api/posts/{post}/comments"),
        &[],
        Some(json!({ "content": "anonymous" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let (router, repos) = app();
    let post = seed_post(&repos, Uuid::new_v4(), false);
    let user = Uuid::new_v4().to_string();

    let (status, _) = send(&router, Method::GET, "/api/posts/not-a-uuid/comments", &[], None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &router,
        Method::POST,
        &format!("/api/posts/{post}/comments"),
        &[("x-user-id", &user)],
        Some(json!({ "content": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
