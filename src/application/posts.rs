//! Post reads and author-scoped writes.

use std::sync::Arc;

use tracing::{instrument, warn};
use uuid::Uuid;

use crate::application::error::AppError;
use crate::application::pagination::{Page, PageRequest, Pagination};
use crate::application::repos::{
    CommentsRepo, CreatePostParams, PostsRepo, PostsWriteRepo, UpdatePostParams,
};
use crate::application::requester::Requester;
use crate::cache::{CacheTrigger, InvalidationOutcome};
use crate::domain::comments::{normalize_content, normalize_title};
use crate::domain::entities::{PostRecord, PostWithStats};

#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Clone)]
pub struct PostService {
    reader: Arc<dyn PostsRepo>,
    writer: Arc<dyn PostsWriteRepo>,
    comments: Arc<dyn CommentsRepo>,
    trending_limit: u64,
    cache_trigger: Option<Arc<CacheTrigger>>,
}

impl PostService {
    pub fn new(
        reader: Arc<dyn PostsRepo>,
        writer: Arc<dyn PostsWriteRepo>,
        comments: Arc<dyn CommentsRepo>,
        trending_limit: u64,
    ) -> Self {
        Self {
            reader,
            writer,
            comments,
            trending_limit,
            cache_trigger: None,
        }
    }

    pub fn with_cache_trigger(mut self, trigger: Arc<CacheTrigger>) -> Self {
        self.cache_trigger = Some(trigger);
        self
    }

    #[instrument(skip(self))]
    pub async fn list(&self, request: PageRequest) -> Result<Page<PostRecord>, AppError> {
        let items = self
            .reader
            .list_posts(request.skip(), u64::from(request.limit()))
            .await?;
        let total = self.reader.count_posts().await?;
        Ok(Page {
            items,
            pagination: Pagination::new(total, request),
        })
    }

    #[instrument(skip(self))]
    pub async fn trending(&self) -> Result<Vec<PostWithStats>, AppError> {
        Ok(self.reader.trending_posts(self.trending_limit).await?)
    }

    #[instrument(skip(self))]
    pub async fn detail(&self, id: Uuid) -> Result<PostWithStats, AppError> {
        let post = self
            .reader
            .find_post_by_id(id, true)
            .await?
            .ok_or(AppError::NotFound("post"))?;
        let comment_count = self.comments.count_comments(id).await?;
        Ok(PostWithStats {
            post,
            comment_count,
        })
    }

    #[instrument(skip(self, title, content), fields(author = %requester.id))]
    pub async fn create(
        &self,
        requester: Requester,
        title: &str,
        content: &str,
    ) -> Result<PostRecord, AppError> {
        let params = CreatePostParams {
            author_id: requester.id,
            title: normalize_title(title)?,
            content: normalize_content(content)?,
        };
        let post = self.writer.create_post(params).await?;
        self.invalidate(post.id);
        Ok(post)
    }

    #[instrument(skip(self, changes), fields(requester = %requester.id))]
    pub async fn update(
        &self,
        requester: Requester,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<PostRecord, AppError> {
        if changes.title.is_none() && changes.content.is_none() {
            return Err(AppError::validation("nothing to update"));
        }
        let title = changes.title.as_deref().map(normalize_title).transpose()?;
        let content = changes
            .content
            .as_deref()
            .map(normalize_content)
            .transpose()?;

        self.authorize(requester, id).await?;

        let post = self
            .writer
            .update_post(UpdatePostParams { id, title, content })
            .await?;
        self.invalidate(post.id);
        Ok(post)
    }

    /// Marks the post deleted. Its comments stay in storage.
    #[instrument(skip(self), fields(requester = %requester.id))]
    pub async fn delete(&self, requester: Requester, id: Uuid) -> Result<(), AppError> {
        self.authorize(requester, id).await?;
        self.writer.soft_delete_post(id).await?;
        self.invalidate(id);
        Ok(())
    }

    async fn authorize(&self, requester: Requester, id: Uuid) -> Result<PostRecord, AppError> {
        let post = self
            .reader
            .find_post_by_id(id, true)
            .await?
            .ok_or(AppError::NotFound("post"))?;
        if !requester.can_modify(post.author_id) {
            return Err(AppError::Forbidden("post"));
        }
        Ok(post)
    }

    // Runs after the write committed; a failed purge never fails the write.
    fn invalidate(&self, post_id: Uuid) {
        let Some(trigger) = &self.cache_trigger else {
            return;
        };
        if let InvalidationOutcome::Degraded { failed, .. } = trigger.post_changed(post_id) {
            warn!(
                %post_id,
                failed = failed.len(),
                "Post write committed with a partial cache purge"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::Method;
    use bytes::Bytes;

    use super::*;
    use crate::cache::{CachedResponse, KeyScheme, MemoryStore, ResponseStore};
    use crate::domain::types::Role;
    use crate::infra::memory::InMemoryRepositories;

    fn service(repos: &Arc<InMemoryRepositories>) -> PostService {
        PostService::new(repos.clone(), repos.clone(), repos.clone(), 10)
    }

    fn user() -> Requester {
        Requester::new(Uuid::new_v4(), Role::User)
    }

    #[tokio::test]
    async fn create_then_detail_reports_zero_comments() {
        let repos = Arc::new(InMemoryRepositories::new());
        let posts = service(&repos);
        let author = user();

        let post = posts.create(author, "  Hello ", "World").await.unwrap();
        assert_eq!(post.title, "Hello");
        assert_eq!(post.author_id, author.id);

        let detail = posts.detail(post.id).await.unwrap();
        assert_eq!(detail.comment_count, 0);
    }

    #[tokio::test]
    async fn only_author_or_admin_may_update() {
        let repos = Arc::new(InMemoryRepositories::new());
        let posts = service(&repos);
        let author = user();
        let post = posts.create(author, "Title", "Body").await.unwrap();

        let changes = PostChanges {
            title: Some("Renamed".to_string()),
            content: None,
        };
        let err = posts
            .update(user(), post.id, changes.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden("post")));

        let admin = Requester::new(Uuid::new_v4(), Role::Admin);
        let updated = posts.update(admin, post.id, changes).await.unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(updated.content, "Body");
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let repos = Arc::new(InMemoryRepositories::new());
        let posts = service(&repos);
        let author = user();
        let post = posts.create(author, "Title", "Body").await.unwrap();

        let err = posts
            .update(author, post.id, PostChanges::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn deleted_posts_disappear_from_reads() {
        let repos = Arc::new(InMemoryRepositories::new());
        let posts = service(&repos);
        let author = user();
        let post = posts.create(author, "Title", "Body").await.unwrap();

        posts.delete(author, post.id).await.unwrap();

        assert!(matches!(
            posts.detail(post.id).await.unwrap_err(),
            AppError::NotFound("post")
        ));
        assert_eq!(posts.list(PageRequest::default()).await.unwrap().items.len(), 0);
        assert!(matches!(
            posts.delete(author, post.id).await.unwrap_err(),
            AppError::NotFound("post")
        ));
    }

    #[tokio::test]
    async fn writes_purge_listing_entries() {
        let repos = Arc::new(InMemoryRepositories::new());
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(KeyScheme::default());
        let trigger = Arc::new(CacheTrigger::new(true, store.clone(), keys.clone()));
        let posts = service(&repos).with_cache_trigger(trigger);

        let listing = keys.key_for_read(&Method::GET, "/api/posts", None);
        store
            .set(
                &listing,
                CachedResponse {
                    status: 200,
                    content_type: None,
                    body: Bytes::from_static(b"[]"),
                },
                Duration::from_secs(300),
            )
            .unwrap();

        posts.create(user(), "Title", "Body").await.unwrap();

        assert!(store.get(&listing).unwrap().is_none());
    }
}
