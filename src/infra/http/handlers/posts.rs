//! Post handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::posts::PostChanges;
use crate::application::requester::Requester;
use crate::infra::http::error::ApiError;
use crate::infra::http::models::{
    ApiEnvelope, PageQuery, PostCreateRequest, PostUpdateRequest, PostView,
};
use crate::infra::http::state::HttpState;

const SOURCE: &str = "infra::http::posts";

fn to_api(err: AppError) -> ApiError {
    ApiError::from_app(SOURCE, err)
}

pub async fn list_posts(
    State(state): State<HttpState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Vec<PostView>>>, ApiError> {
    let Query(query) = query?;
    let page = state.posts.list(query.into()).await.map_err(to_api)?;
    let views = page.items.into_iter().map(PostView::from).collect();
    Ok(Json(ApiEnvelope::paginated(views, page.pagination)))
}

pub async fn trending_posts(
    State(state): State<HttpState>,
) -> Result<Json<ApiEnvelope<Vec<PostView>>>, ApiError> {
    let ranked = state.posts.trending().await.map_err(to_api)?;
    Ok(Json(ApiEnvelope::ok(
        ranked.into_iter().map(PostView::from).collect(),
    )))
}

pub async fn get_post(
    State(state): State<HttpState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiEnvelope<PostView>>, ApiError> {
    let Path(id) = id?;
    let detail = state.posts.detail(id).await.map_err(to_api)?;
    Ok(Json(ApiEnvelope::ok(detail.into())))
}

pub async fn create_post(
    State(state): State<HttpState>,
    requester: Requester,
    payload: Result<Json<PostCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<PostView>>), ApiError> {
    let Json(payload) = payload?;
    let post = state
        .posts
        .create(requester, &payload.title, &payload.content)
        .await
        .map_err(to_api)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok(post.into()).with_message("Post created")),
    ))
}

pub async fn update_post(
    State(state): State<HttpState>,
    requester: Requester,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<PostUpdateRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<PostView>>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let changes = PostChanges {
        title: payload.title,
        content: payload.content,
    };
    let post = state
        .posts
        .update(requester, id, changes)
        .await
        .map_err(to_api)?;
    Ok(Json(ApiEnvelope::ok(post.into()).with_message("Post updated")))
}

pub async fn delete_post(
    State(state): State<HttpState>,
    requester: Requester,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiEnvelope<()>>, ApiError> {
    let Path(id) = id?;
    state.posts.delete(requester, id).await.map_err(to_api)?;
    Ok(Json(ApiEnvelope {
        success: true,
        data: None,
        message: Some("Post deleted".to_string()),
        pagination: None,
    }))
}
