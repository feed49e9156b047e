//! In-process repositories.
//!
//! Used when no database is configured and by tests. Each write takes a
//! single lock, so the comment cascade is atomic like its Postgres
//! counterpart.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CommentsWriteRepo, CreateCommentParams, CreatePostParams, PostsRepo,
    PostsWriteRepo, RepoError, UpdateCommentParams, UpdatePostParams,
};
use crate::domain::entities::{CommentRecord, PostRecord, PostWithStats};
use crate::domain::types::SortOrder;

#[derive(Debug, Default)]
struct Tables {
    posts: HashMap<Uuid, PostRecord>,
    comments: HashMap<Uuid, CommentRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepositories {
    tables: RwLock<Tables>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a post as-is, replacing any post with the same id.
    pub fn insert_post(&self, post: PostRecord) {
        self.write().posts.insert(post.id, post);
    }

    /// Stores a comment as-is, replacing any comment with the same id.
    pub fn insert_comment(&self, comment: CommentRecord) {
        self.write().comments.insert(comment.id, comment);
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sort_by_created(records: &mut [CommentRecord], order: SortOrder) {
    records.sort_by(|a, b| {
        let ascending = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
        match order {
            SortOrder::OldestFirst => ascending,
            SortOrder::NewestFirst => ascending.reverse(),
        }
    });
}

fn window<T>(items: Vec<T>, skip: u64, limit: u64) -> Vec<T> {
    let skip = usize::try_from(skip).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(limit).collect()
}

fn newest_first(a: &PostRecord, b: &PostRecord) -> std::cmp::Ordering {
    b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id))
}

#[async_trait]
impl PostsRepo for InMemoryRepositories {
    async fn find_post_by_id(
        &self,
        id: Uuid,
        exclude_deleted: bool,
    ) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .read()
            .posts
            .get(&id)
            .filter(|post| !exclude_deleted || !post.is_deleted)
            .cloned())
    }

    async fn list_posts(&self, skip: u64, limit: u64) -> Result<Vec<PostRecord>, RepoError> {
        let mut live: Vec<PostRecord> = self
            .read()
            .posts
            .values()
            .filter(|post| !post.is_deleted)
            .cloned()
            .collect();
        live.sort_by(newest_first);
        Ok(window(live, skip, limit))
    }

    async fn count_posts(&self) -> Result<u64, RepoError> {
        Ok(self.read().posts.values().filter(|post| !post.is_deleted).count() as u64)
    }

    async fn trending_posts(&self, limit: u64) -> Result<Vec<PostWithStats>, RepoError> {
        let tables = self.read();
        let mut counts: HashMap<Uuid, u64> = HashMap::new();
        for comment in tables.comments.values() {
            if is_attached(comment, &tables.comments) {
                *counts.entry(comment.post_id).or_default() += 1;
            }
        }

        let mut ranked: Vec<PostWithStats> = tables
            .posts
            .values()
            .filter(|post| !post.is_deleted)
            .map(|post| PostWithStats {
                post: post.clone(),
                comment_count: counts.get(&post.id).copied().unwrap_or(0),
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.comment_count
                .cmp(&a.comment_count)
                .then_with(|| newest_first(&a.post, &b.post))
        });
        Ok(window(ranked, 0, limit))
    }
}

#[async_trait]
impl PostsWriteRepo for InMemoryRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let now = OffsetDateTime::now_utc();
        let post = PostRecord {
            id: Uuid::new_v4(),
            author_id: params.author_id,
            title: params.title,
            content: params.content,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.insert_post(post.clone());
        Ok(post)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut tables = self.write();
        let post = tables
            .posts
            .get_mut(&params.id)
            .filter(|post| !post.is_deleted)
            .ok_or(RepoError::NotFound)?;
        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(content) = params.content {
            post.content = content;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn soft_delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tables = self.write();
        let post = tables
            .posts
            .get_mut(&id)
            .filter(|post| !post.is_deleted)
            .ok_or(RepoError::NotFound)?;
        post.is_deleted = true;
        post.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for InMemoryRepositories {
    async fn find_comment_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        Ok(self.read().comments.get(&id).cloned())
    }

    async fn find_top_level_comments(
        &self,
        post_id: Uuid,
        skip: u64,
        limit: u64,
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let mut top_level: Vec<CommentRecord> = self
            .read()
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id && comment.is_top_level())
            .cloned()
            .collect();
        sort_by_created(&mut top_level, order);
        Ok(window(top_level, skip, limit))
    }

    async fn find_replies(
        &self,
        parent_ids: &[Uuid],
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let mut replies: Vec<CommentRecord> = self
            .read()
            .comments
            .values()
            .filter(|comment| {
                comment
                    .parent_id
                    .is_some_and(|parent| parent_ids.contains(&parent))
            })
            .cloned()
            .collect();
        sort_by_created(&mut replies, order);
        Ok(replies)
    }

    async fn count_top_level_comments(&self, post_id: Uuid) -> Result<u64, RepoError> {
        Ok(self
            .read()
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id && comment.is_top_level())
            .count() as u64)
    }

    async fn count_comments(&self, post_id: Uuid) -> Result<u64, RepoError> {
        let tables = self.read();
        Ok(tables
            .comments
            .values()
            .filter(|comment| comment.post_id == post_id && is_attached(comment, &tables.comments))
            .count() as u64)
    }
}

/// Replies whose parent was deleted are never listed, so they are not counted.
fn is_attached(comment: &CommentRecord, comments: &HashMap<Uuid, CommentRecord>) -> bool {
    comment
        .parent_id
        .is_none_or(|parent| comments.contains_key(&parent))
}

#[async_trait]
impl CommentsWriteRepo for InMemoryRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.write();
        if !tables.posts.contains_key(&params.post_id) {
            return Err(RepoError::InvalidInput {
                message: format!("post {} does not exist", params.post_id),
            });
        }
        let comment = CommentRecord {
            id: Uuid::new_v4(),
            post_id: params.post_id,
            author_id: params.author_id,
            parent_id: params.parent_id,
            content: params.content,
            is_edited: false,
            edited_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        params: UpdateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut tables = self.write();
        let comment = tables
            .comments
            .get_mut(&params.id)
            .ok_or(RepoError::NotFound)?;
        comment.content = params.content;
        comment.is_edited = true;
        comment.edited_at = Some(params.edited_at);
        Ok(comment.clone())
    }

    async fn delete_comment_cascade(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut tables = self.write();
        if tables.comments.remove(&id).is_none() {
            return Err(RepoError::NotFound);
        }
        let before = tables.comments.len();
        tables
            .comments
            .retain(|_, comment| comment.parent_id != Some(id));
        Ok(1 + (before - tables.comments.len()) as u64)
    }
}
