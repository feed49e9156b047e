//! Comment threads and content rules.

use std::collections::HashMap;

use uuid::Uuid;

use super::entities::CommentRecord;
use super::error::DomainError;

pub const MAX_CONTENT_CHARS: usize = 10_000;
pub const MAX_TITLE_CHARS: usize = 300;

/// A top-level comment with its direct replies, oldest first.
///
/// Replies of replies are never expanded.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    pub comment: CommentRecord,
    pub replies: Vec<CommentRecord>,
}

/// Attaches `replies` to their parents in `top_level`.
///
/// `top_level` keeps its order. Each reply list is ordered by `created_at`
/// ascending (ties by id) regardless of input order. Replies whose parent is
/// not on this page are dropped.
pub fn assemble_threads(
    top_level: Vec<CommentRecord>,
    replies: Vec<CommentRecord>,
) -> Vec<CommentThread> {
    let mut by_parent: HashMap<Uuid, Vec<CommentRecord>> = HashMap::new();
    for reply in replies {
        if let Some(parent_id) = reply.parent_id {
            by_parent.entry(parent_id).or_default().push(reply);
        }
    }

    top_level
        .into_iter()
        .map(|comment| {
            let mut replies = by_parent.remove(&comment.id).unwrap_or_default();
            replies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            CommentThread { comment, replies }
        })
        .collect()
}

/// Trims and checks comment or post body text.
pub fn normalize_content(content: &str) -> Result<String, DomainError> {
    normalize_text(content, "content", MAX_CONTENT_CHARS)
}

/// Trims and checks a post title.
pub fn normalize_title(title: &str) -> Result<String, DomainError> {
    normalize_text(title, "title", MAX_TITLE_CHARS)
}

fn normalize_text(
    value: &str,
    field: &'static str,
    max_chars: usize,
) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::EmptyField { field });
    }
    if trimmed.chars().count() > max_chars {
        return Err(DomainError::TooLong { field, max_chars });
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use time::{Duration, OffsetDateTime};

    use super::*;

    fn comment(parent: Option<Uuid>, offset_secs: i64) -> CommentRecord {
        let created_at = OffsetDateTime::UNIX_EPOCH + Duration::seconds(offset_secs);
        CommentRecord {
            id: Uuid::new_v4(),
            post_id: Uuid::nil(),
            author_id: Uuid::nil(),
            parent_id: parent,
            content: format!("at {offset_secs}"),
            is_edited: false,
            edited_at: None,
            created_at,
        }
    }

    #[test]
    fn replies_attach_to_their_parent_in_conversation_order() {
        let t1 = comment(None, 1);
        let t2 = comment(None, 2);
        let r2 = comment(Some(t1.id), 5);
        let r1 = comment(Some(t1.id), 4);

        let threads = assemble_threads(vec![t2.clone(), t1.clone()], vec![r2.clone(), r1.clone()]);

        assert_eq!(threads.len(), 2);
        assert_eq!(threads[0].comment.id, t2.id);
        assert!(threads[0].replies.is_empty());
        assert_eq!(threads[1].comment.id, t1.id);
        assert_eq!(threads[1].replies, vec![r1, r2]);
    }

    #[test]
    fn replies_to_comments_off_the_page_are_dropped() {
        let t1 = comment(None, 1);
        let stray = comment(Some(Uuid::new_v4()), 2);

        let threads = assemble_threads(vec![t1], vec![stray]);
        assert!(threads[0].replies.is_empty());
    }

    #[test]
    fn content_is_trimmed_and_bounded() {
        assert_eq!(normalize_content("  hi  ").unwrap(), "hi");
        assert_eq!(
            normalize_content("   "),
            Err(DomainError::EmptyField { field: "content" })
        );
        assert!(normalize_content(&"x".repeat(MAX_CONTENT_CHARS + 1)).is_err());
        assert!(normalize_title(&"t".repeat(MAX_TITLE_CHARS)).is_ok());
    }
}
