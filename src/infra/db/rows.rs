use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::{CommentRecord, PostRecord, PostWithStats};

use super::util::convert_count;

pub(crate) const POST_COLUMNS: &str =
    "p.id, p.author_id, p.title, p.content, p.is_deleted, p.created_at, p.updated_at";

pub(crate) const COMMENT_COLUMNS: &str =
    "c.id, c.post_id, c.author_id, c.parent_id, c.content, c.is_edited, c.edited_at, c.created_at";

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) is_deleted: bool,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            title: row.title,
            content: row.content,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct PostStatsRow {
    #[sqlx(flatten)]
    pub(crate) post: PostRow,
    pub(crate) comment_count: i64,
}

impl TryFrom<PostStatsRow> for PostWithStats {
    type Error = RepoError;

    fn try_from(row: PostStatsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            post: row.post.into(),
            comment_count: convert_count(row.comment_count)?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub(crate) id: Uuid,
    pub(crate) post_id: Uuid,
    pub(crate) author_id: Uuid,
    pub(crate) parent_id: Option<Uuid>,
    pub(crate) content: String,
    pub(crate) is_edited: bool,
    pub(crate) edited_at: Option<OffsetDateTime>,
    pub(crate) created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            parent_id: row.parent_id,
            content: row.content,
            is_edited: row.is_edited,
            edited_at: row.edited_at,
            created_at: row.created_at,
        }
    }
}
