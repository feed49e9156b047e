//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{CommentRecord, PostRecord, PostWithStats};
use crate::domain::types::SortOrder;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UpdateCommentParams {
    pub id: Uuid,
    pub content: String,
    pub edited_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post_by_id(
        &self,
        id: Uuid,
        exclude_deleted: bool,
    ) -> Result<Option<PostRecord>, RepoError>;

    /// Non-deleted posts, newest first.
    async fn list_posts(&self, skip: u64, limit: u64) -> Result<Vec<PostRecord>, RepoError>;

    async fn count_posts(&self) -> Result<u64, RepoError>;

    /// Non-deleted posts by comment count descending, ties newest first.
    async fn trending_posts(&self, limit: u64) -> Result<Vec<PostWithStats>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn soft_delete_post(&self, id: Uuid) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    async fn find_comment_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError>;

    /// One page of a post's top-level comments.
    ///
    /// Ties on `created_at` are broken by id in the same direction.
    async fn find_top_level_comments(
        &self,
        post_id: Uuid,
        skip: u64,
        limit: u64,
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError>;

    /// Direct replies to any of `parent_ids`, in one pass.
    async fn find_replies(
        &self,
        parent_ids: &[Uuid],
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError>;

    async fn count_top_level_comments(&self, post_id: Uuid) -> Result<u64, RepoError>;

    /// Every comment of the post, replies included.
    async fn count_comments(&self, post_id: Uuid) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait CommentsWriteRepo: Send + Sync {
    async fn create_comment(&self, params: CreateCommentParams)
    -> Result<CommentRecord, RepoError>;

    async fn update_comment(&self, params: UpdateCommentParams)
    -> Result<CommentRecord, RepoError>;

    /// Removes the comment and its direct replies atomically.
    ///
    /// Returns the number of removed comments.
    async fn delete_comment_cascade(&self, id: Uuid) -> Result<u64, RepoError>;
}
