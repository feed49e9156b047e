use async_trait::async_trait;
use sqlx::QueryBuilder;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{
    CommentsRepo, CommentsWriteRepo, CreateCommentParams, RepoError, UpdateCommentParams,
};
use crate::domain::entities::CommentRecord;
use crate::domain::types::SortOrder;

use super::PostgresRepositories;
use super::map_sqlx_error;
use super::rows::{COMMENT_COLUMNS, CommentRow};
use super::util::{convert_count, to_bigint};

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn find_comment_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        let mut qb =
            QueryBuilder::new(format!("SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.id = "));
        qb.push_bind(id);

        let row = qb
            .build_query_as::<CommentRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn find_top_level_comments(
        &self,
        post_id: Uuid,
        skip: u64,
        limit: u64,
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.parent_id IS NULL AND c.post_id = "
        ));
        qb.push_bind(post_id);
        qb.push(format!(
            " ORDER BY c.created_at {dir}, c.id {dir} LIMIT ",
            dir = order.as_sql()
        ));
        qb.push_bind(to_bigint(limit, "limit")?);
        qb.push(" OFFSET ");
        qb.push_bind(to_bigint(skip, "offset")?);

        let rows = qb
            .build_query_as::<CommentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn find_replies(
        &self,
        parent_ids: &[Uuid],
        order: SortOrder,
    ) -> Result<Vec<CommentRecord>, RepoError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::new(format!(
            "SELECT {COMMENT_COLUMNS} FROM comments c WHERE c.parent_id = ANY("
        ));
        qb.push_bind(parent_ids.to_vec());
        qb.push(format!(
            ") ORDER BY c.created_at {dir}, c.id {dir}",
            dir = order.as_sql()
        ));

        let rows = qb
            .build_query_as::<CommentRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn count_top_level_comments(&self, post_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments WHERE post_id = $1 AND parent_id IS NULL",
        )
        .bind(post_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        convert_count(count)
    }

    async fn count_comments(&self, post_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments c WHERE c.post_id = $1 \
             AND (c.parent_id IS NULL OR EXISTS (SELECT 1 FROM comments parent WHERE parent.id = c.parent_id))",
        )
        .bind(post_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        convert_count(count)
    }
}

#[async_trait]
impl CommentsWriteRepo for PostgresRepositories {
    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut qb = QueryBuilder::new(
            "INSERT INTO comments AS c (id, post_id, author_id, parent_id, content) VALUES (",
        );
        let mut values = qb.separated(", ");
        values.push_bind(Uuid::new_v4());
        values.push_bind(params.post_id);
        values.push_bind(params.author_id);
        values.push_bind(params.parent_id);
        values.push_bind(params.content);
        qb.push(format!(") RETURNING {COMMENT_COLUMNS}"));

        let row = qb
            .build_query_as::<CommentRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn update_comment(
        &self,
        params: UpdateCommentParams,
    ) -> Result<CommentRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE comments AS c SET is_edited = TRUE, content = ");
        qb.push_bind(params.content);
        qb.push(", edited_at = ");
        qb.push_bind(params.edited_at);
        qb.push(" WHERE c.id = ");
        qb.push_bind(params.id);
        qb.push(format!(" RETURNING {COMMENT_COLUMNS}"));

        let row = qb
            .build_query_as::<CommentRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(row.into())
    }

    async fn delete_comment_cascade(&self, id: Uuid) -> Result<u64, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let replies = sqlx::query("DELETE FROM comments WHERE parent_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        let own = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .rows_affected();

        if own == 0 {
            // Dropping the transaction rolls the reply deletion back.
            return Err(RepoError::NotFound);
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(comment = %id, replies, "Comment deleted with its replies");

        Ok(own + replies)
    }
}
