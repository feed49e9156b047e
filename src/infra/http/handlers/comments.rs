//! Comment handlers

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use uuid::Uuid;

use crate::application::comments::NewComment;
use crate::application::error::AppError;
use crate::application::requester::Requester;
use crate::infra::http::error::ApiError;
use crate::infra::http::models::{
    ApiEnvelope, CommentCreateRequest, CommentThreadView, CommentUpdateRequest, CommentView,
    DeletedCommentView, PageQuery,
};
use crate::infra::http::state::HttpState;

const SOURCE: &str = "infra::http::comments";

fn to_api(err: AppError) -> ApiError {
    ApiError::from_app(SOURCE, err)
}

pub async fn list_comments(
    State(state): State<HttpState>,
    post_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<ApiEnvelope<Vec<CommentThreadView>>>, ApiError> {
    let Path(post_id) = post_id?;
    let Query(query) = query?;
    let page = state
        .comment_tree
        .read(post_id, query.into())
        .await
        .map_err(to_api)?;
    let page = page.map(CommentThreadView::from);
    Ok(Json(ApiEnvelope::paginated(page.items, page.pagination)))
}

pub async fn create_comment(
    State(state): State<HttpState>,
    requester: Requester,
    post_id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CommentCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiEnvelope<CommentView>>), ApiError> {
    let Path(post_id) = post_id?;
    let Json(payload) = payload?;
    let comment = state
        .comments
        .create(
            requester,
            post_id,
            NewComment {
                content: payload.content,
                parent_id: payload.parent_id,
            },
        )
        .await
        .map_err(to_api)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiEnvelope::ok(comment.into()).with_message("Comment created")),
    ))
}

pub async fn update_comment(
    State(state): State<HttpState>,
    requester: Requester,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<CommentUpdateRequest>, JsonRejection>,
) -> Result<Json<ApiEnvelope<CommentView>>, ApiError> {
    let Path(id) = id?;
    let Json(payload) = payload?;
    let comment = state
        .comments
        .update(requester, id, &payload.content)
        .await
        .map_err(to_api)?;
    Ok(Json(
        ApiEnvelope::ok(comment.into()).with_message("Comment updated"),
    ))
}

pub async fn delete_comment(
    State(state): State<HttpState>,
    requester: Requester,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiEnvelope<DeletedCommentView>>, ApiError> {
    let Path(id) = id?;
    let deleted = state
        .comments
        .delete(requester, id)
        .await
        .map_err(to_api)?;
    Ok(Json(
        ApiEnvelope::ok(deleted.into()).with_message("Comment deleted"),
    ))
}
