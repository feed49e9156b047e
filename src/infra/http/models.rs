use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::comments::DeletedComment;
use crate::application::pagination::{PageRequest, Pagination};
use crate::domain::comments::CommentThread;
use crate::domain::entities::{CommentRecord, PostRecord, PostWithStats};

/// Response envelope shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            pagination: None,
        }
    }

    pub fn paginated(data: T, pagination: Pagination) -> Self {
        Self {
            pagination: Some(pagination),
            ..Self::ok(data)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl ApiEnvelope<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            pagination: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageQuery> for PageRequest {
    fn from(query: PageQuery) -> Self {
        PageRequest::new(query.page, query.limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct PostCreateRequest {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PostUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommentCreateRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CommentUpdateRequest {
    pub content: String,
}

fn rfc3339(value: OffsetDateTime) -> String {
    value.format(&Rfc3339).unwrap_or_else(|_| value.to_string())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostView {
    pub id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

impl From<PostRecord> for PostView {
    fn from(post: PostRecord) -> Self {
        Self {
            id: post.id,
            author_id: post.author_id,
            title: post.title,
            content: post.content,
            created_at: rfc3339(post.created_at),
            updated_at: rfc3339(post.updated_at),
            comment_count: None,
        }
    }
}

impl From<PostWithStats> for PostView {
    fn from(stats: PostWithStats) -> Self {
        Self {
            comment_count: Some(stats.comment_count),
            ..Self::from(stats.post)
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub parent_id: Option<Uuid>,
    pub content: String,
    pub is_edited: bool,
    pub edited_at: Option<String>,
    pub created_at: String,
}

impl From<CommentRecord> for CommentView {
    fn from(comment: CommentRecord) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            author_id: comment.author_id,
            parent_id: comment.parent_id,
            content: comment.content,
            is_edited: comment.is_edited,
            edited_at: comment.edited_at.map(rfc3339),
            created_at: rfc3339(comment.created_at),
        }
    }
}

/// A top-level comment with its `replies` nested alongside its own fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommentThreadView {
    #[serde(flatten)]
    pub comment: CommentView,
    pub replies: Vec<CommentView>,
}

impl From<CommentThread> for CommentThreadView {
    fn from(thread: CommentThread) -> Self {
        Self {
            comment: thread.comment.into(),
            replies: thread.replies.into_iter().map(CommentView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedCommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub removed: u64,
}

impl From<DeletedComment> for DeletedCommentView {
    fn from(deleted: DeletedComment) -> Self {
        Self {
            id: deleted.id,
            post_id: deleted.post_id,
            removed: deleted.removed,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;

    #[test]
    fn failure_envelope_omits_empty_fields() {
        let body = serde_json::to_value(ApiEnvelope::<()>::failure("Post not found")).unwrap();
        assert_eq!(body, json!({ "success": false, "message": "Post not found" }));
    }

    #[test]
    fn paginated_envelope_carries_page_metadata() {
        let pagination = Pagination::new(41, PageRequest::new(Some(2), Some(20)));
        let body = serde_json::to_value(ApiEnvelope::paginated(Vec::<u8>::new(), pagination))
            .unwrap();
        assert_eq!(
            body["pagination"],
            json!({ "total": 41, "page": 2, "limit": 20, "pages": 3 })
        );
    }

    #[test]
    fn thread_view_nests_replies_next_to_comment_fields() {
        let parent = CommentRecord {
            id: Uuid::new_v4(),
            post_id: Uuid::new_v4(),
            author_id: Uuid::new_v4(),
            parent_id: None,
            content: "top".to_string(),
            is_edited: false,
            edited_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let reply = CommentRecord {
            id: Uuid::new_v4(),
            parent_id: Some(parent.id),
            content: "reply".to_string(),
            ..parent.clone()
        };

        let view = CommentThreadView::from(CommentThread {
            comment: parent.clone(),
            replies: vec![reply],
        });
        let body: Value = serde_json::to_value(view).unwrap();

        assert_eq!(body["id"], json!(parent.id));
        assert_eq!(body["created_at"], json!("1970-01-01T00:00:00Z"));
        assert_eq!(body["replies"][0]["content"], json!("reply"));
    }
}
