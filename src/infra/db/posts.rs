use async_trait::async_trait;
use sqlx::QueryBuilder;
use uuid::Uuid;

use crate::application::repos::{
    CreatePostParams, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{PostRecord, PostWithStats};

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::rows::{POST_COLUMNS, PostRow, PostStatsRow};
use super::util::{convert_count, to_bigint};

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post_by_id(
        &self,
        id: Uuid,
        exclude_deleted: bool,
    ) -> Result<Option<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = "));
        qb.push_bind(id);
        if exclude_deleted {
            qb.push(" AND NOT p.is_deleted");
        }

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn list_posts(&self, skip: u64, limit: u64) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS} FROM posts p WHERE NOT p.is_deleted \
             ORDER BY p.created_at DESC, p.id DESC LIMIT "
        ));
        qb.push_bind(to_bigint(limit, "limit")?);
        qb.push(" OFFSET ");
        qb.push_bind(to_bigint(skip, "offset")?);

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn count_posts(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE NOT is_deleted")
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_count(count)
    }

    async fn trending_posts(&self, limit: u64) -> Result<Vec<PostWithStats>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {POST_COLUMNS}, COUNT(c.id) AS comment_count \
             FROM posts p LEFT JOIN comments c ON c.post_id = p.id \
             AND (c.parent_id IS NULL OR EXISTS (SELECT 1 FROM comments parent WHERE parent.id = c.parent_id)) \
             WHERE NOT p.is_deleted \
             GROUP BY p.id \
             ORDER BY comment_count DESC, p.created_at DESC, p.id DESC LIMIT "
        ));
        qb.push_bind(to_bigint(limit, "limit")?);

        let rows = qb
            .build_query_as::<PostStatsRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(PostWithStats::try_from).collect()
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut qb = QueryBuilder::new(
            "INSERT INTO posts AS p (id, author_id, title, content) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(Uuid::new_v4());
        values.push_bind(params.author_id);
        values.push_bind(params.title);
        values.push_bind(params.content);
        qb.push(format!(") RETURNING {POST_COLUMNS}"));

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE posts AS p SET title = COALESCE(");
        qb.push_bind(params.title);
        qb.push(", p.title), content = COALESCE(");
        qb.push_bind(params.content);
        qb.push(", p.content), updated_at = now() WHERE p.id = ");
        qb.push_bind(params.id);
        qb.push(format!(" AND NOT p.is_deleted RETURNING {POST_COLUMNS}"));

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn soft_delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE posts SET is_deleted = TRUE, updated_at = now() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
