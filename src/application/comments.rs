//! Comment threads: paged retrieval and author-scoped writes.

use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Page, PageRequest, Pagination};
use crate::application::repos::{
    CommentsRepo, CommentsWriteRepo, CreateCommentParams, PostsRepo, UpdateCommentParams,
};
use crate::application::requester::Requester;
use crate::cache::{CacheTrigger, InvalidationOutcome, ResourceRef};
use crate::domain::comments::{CommentThread, assemble_threads, normalize_content};
use crate::domain::entities::CommentRecord;
use crate::domain::types::SortOrder;

/// Reads one page of a post's comment tree.
#[derive(Clone)]
pub struct CommentTreeReader {
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl CommentTreeReader {
    pub fn new(posts: Arc<dyn PostsRepo>, comments: Arc<dyn CommentsRepo>) -> Self {
        Self { posts, comments }
    }

    /// Top-level comments newest first, each with all of its direct replies
    /// oldest first. Only top-level comments count towards pagination.
    ///
    /// Replies for the whole page are fetched in a single query.
    #[instrument(skip(self))]
    pub async fn read(
        &self,
        post_id: Uuid,
        request: PageRequest,
    ) -> Result<Page<CommentThread>, AppError> {
        self.posts
            .find_post_by_id(post_id, true)
            .await?
            .ok_or(AppError::NotFound("post"))?;

        let top_level = self
            .comments
            .find_top_level_comments(
                post_id,
                request.skip(),
                u64::from(request.limit()),
                SortOrder::NewestFirst,
            )
            .await?;

        let parent_ids: Vec<Uuid> = top_level.iter().map(|comment| comment.id).collect();
        let replies = if parent_ids.is_empty() {
            Vec::new()
        } else {
            self.comments
                .find_replies(&parent_ids, SortOrder::OldestFirst)
                .await?
        };

        let total = self.comments.count_top_level_comments(post_id).await?;
        debug!(
            top_level = top_level.len(),
            replies = replies.len(),
            total,
            "Comment page assembled"
        );

        Ok(Page {
            items: assemble_threads(top_level, replies),
            pagination: Pagination::new(total, request),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletedComment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// The comment itself plus its direct replies.
    pub removed: u64,
}

#[derive(Clone)]
pub struct CommentService {
    posts: Arc<dyn PostsRepo>,
    reader: Arc<dyn CommentsRepo>,
    writer: Arc<dyn CommentsWriteRepo>,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

impl CommentService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        reader: Arc<dyn CommentsRepo>,
        writer: Arc<dyn CommentsWriteRepo>,
    ) -> Self {
        Self {
            posts,
            reader,
            writer,
            cache_trigger: None,
        }
    }

    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    #[instrument(skip(self, comment), fields(author = %requester.id))]
    pub async fn create(
        &self,
        requester: Requester,
        post_id: Uuid,
        comment: NewComment,
    ) -> Result<CommentRecord, AppError> {
        let content = normalize_content(&comment.content)?;

        self.posts
            .find_post_by_id(post_id, true)
            .await?
            .ok_or(AppError::NotFound("post"))?;

        if let Some(parent_id) = comment.parent_id {
            let parent = self
                .reader
                .find_comment_by_id(parent_id)
                .await?
                .filter(|parent| parent.post_id == post_id)
                .ok_or(AppError::NotFound("parent comment"))?;
            debug!(parent = %parent.id, "Creating reply");
        }

        let created = self
            .writer
            .create_comment(CreateCommentParams {
                post_id,
                author_id: requester.id,
                parent_id: comment.parent_id,
                content,
            })
            .await?;

        self.invalidate(&[ResourceRef::comment(created.id, created.post_id)]);
        Ok(created)
    }

    #[instrument(skip(self, content), fields(requester = %requester.id))]
    pub async fn update(
        &self,
        requester: Requester,
        id: Uuid,
        content: &str,
    ) -> Result<CommentRecord, AppError> {
        let content = normalize_content(content)?;
        let existing = self.authorize(requester, id).await?;

        let updated = self
            .writer
            .update_comment(UpdateCommentParams {
                id: existing.id,
                content,
                edited_at: OffsetDateTime::now_utc(),
            })
            .await?;

        self.invalidate(&[ResourceRef::comment(updated.id, updated.post_id)]);
        Ok(updated)
    }

    /// Deletes the comment together with its direct replies.
    #[instrument(skip(self), fields(requester = %requester.id))]
    pub async fn delete(&self, requester: Requester, id: Uuid) -> Result<DeletedComment, AppError> {
        let existing = self.authorize(requester, id).await?;

        let removed = self.writer.delete_comment_cascade(existing.id).await?;

        self.invalidate(&[ResourceRef::comment(existing.id, existing.post_id)]);
        Ok(DeletedComment {
            id: existing.id,
            post_id: existing.post_id,
            removed,
        })
    }

    async fn authorize(&self, requester: Requester, id: Uuid) -> Result<CommentRecord, AppError> {
        let existing = self
            .reader
            .find_comment_by_id(id)
            .await?
            .ok_or(AppError::NotFound("comment"))?;
        if !requester.can_modify(existing.author_id) {
            return Err(AppError::Forbidden("comment"));
        }
        Ok(existing)
    }

    // Runs after the write committed; a failed purge never fails the write.
    fn invalidate(&self, resources: &[ResourceRef]) {
        let Some(trigger) = &self.cache_trigger else {
            return;
        };
        if let InvalidationOutcome::Degraded { failed, .. } = trigger.invalidate(resources) {
            warn!(
                failed = failed.len(),
                "Comment write committed with a partial cache purge"
            );
        }
    }
}
