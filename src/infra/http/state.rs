use std::sync::Arc;

use crate::application::comments::{CommentService, CommentTreeReader};
use crate::application::posts::PostService;
use crate::application::repos::{CommentsRepo, CommentsWriteRepo, PostsRepo, PostsWriteRepo};
use crate::cache::{CacheTrigger, ResponseCache};
use crate::infra::db::PostgresRepositories;

#[derive(Clone)]
pub struct HttpState {
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub comment_tree: Arc<CommentTreeReader>,
    pub cache: ResponseCache,
    /// `None` when running on the in-memory store.
    pub db: Option<Arc<PostgresRepositories>>,
}

impl HttpState {
    /// Wires the services over one repository set and the shared cache.
    ///
    /// Writes invalidate through a trigger over the same store the read
    /// middleware fills.
    pub fn assemble<R>(repos: Arc<R>, cache: ResponseCache, trending_limit: u64) -> Self
    where
        R: PostsRepo + PostsWriteRepo + CommentsRepo + CommentsWriteRepo + 'static,
    {
        let trigger = Arc::new(CacheTrigger::new(
            cache.config().enabled,
            cache.store().clone(),
            cache.keys().clone(),
        ));

        let posts = PostService::new(repos.clone(), repos.clone(), repos.clone(), trending_limit)
            .with_cache_trigger(trigger.clone());
        let comments = CommentService::new(repos.clone(), repos.clone(), repos.clone())
            .with_cache_trigger(trigger);
        let comment_tree = CommentTreeReader::new(repos.clone(), repos);

        Self {
            posts: Arc::new(posts),
            comments: Arc::new(comments),
            comment_tree: Arc::new(comment_tree),
            cache,
            db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<PostgresRepositories>) -> Self {
        self.db = Some(db);
        self
    }
}
