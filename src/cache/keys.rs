//! Cache key scheme.
//!
//! A read key looks like `{scope}|{METHOD} {path}[?{query}]`. The scope comes
//! from a first-match route table and names the resource the response
//! depends on; invalidation works on scopes, so a write never has to know
//! which query strings were cached.

use std::fmt;

use axum::http::Method;
use url::form_urlencoded;
use uuid::Uuid;

/// Separates the scope from the request part of a key.
const SCOPE_SEPARATOR: char = '|';

/// Scope for requests that match no rule.
const FALLBACK_SCOPE: &str = "path";

/// Route table used by the service. First match wins, so literal routes
/// must precede parameterised siblings.
const DEFAULT_RULES: &[(&str, &str)] = &[
    ("/api/posts", "posts:list"),
    ("/api/posts/trending", "posts:trending"),
    ("/api/posts/{id}", "post:{id}:detail"),
    ("/api/posts/{id}/comments", "post:{id}:comments"),
];

/// Scope of the post listing.
pub const POSTS_LIST_SCOPE: &str = "posts:list";
/// Scope of the trending listing.
pub const POSTS_TRENDING_SCOPE: &str = "posts:trending";

/// Builds the detail scope of a post.
pub fn post_detail_scope(post_id: Uuid) -> String {
    format!("post:{post_id}:detail")
}

/// Builds the comment-listing scope of a post.
pub fn post_comments_scope(post_id: Uuid) -> String {
    format!("post:{post_id}:comments")
}

/// A resource touched by a write.
///
/// Comments carry their owning post because every cached read that
/// depends on a comment is scoped by that post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceRef {
    Post { id: Uuid },
    Comment { id: Uuid, post_id: Uuid },
}

impl ResourceRef {
    pub fn post(id: Uuid) -> Self {
        Self::Post { id }
    }

    pub fn comment(id: Uuid, post_id: Uuid) -> Self {
        Self::Comment { id, post_id }
    }
}

/// A scope to purge: every key cached under it, whatever its query string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvalidationTarget {
    scope: String,
}

impl InvalidationTarget {
    pub fn scope(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        key.strip_prefix(self.scope.as_str())
            .is_some_and(|rest| rest.starts_with(SCOPE_SEPARATOR))
    }
}

impl fmt::Display for InvalidationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope:{}", self.scope)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
struct ScopeRule {
    segments: Vec<Segment>,
    scope: String,
}

impl ScopeRule {
    fn parse(pattern: &str, scope: &str) -> Self {
        let segments = split_path(pattern)
            .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();
        Self {
            segments,
            scope: scope.to_string(),
        }
    }

    fn resolve(&self, path: &str) -> Option<String> {
        let parts: Vec<&str> = split_path(path).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut scope = self.scope.clone();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    // Ids are case-insensitive; UUID case variants share a scope.
                    scope = scope.replace(&format!("{{{name}}}"), &part.to_ascii_lowercase());
                }
            }
        }
        Some(scope)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Maps reads to keys and writes to invalidation targets.
#[derive(Debug, Clone)]
pub struct KeyScheme {
    rules: Vec<ScopeRule>,
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self::with_rules(DEFAULT_RULES)
    }
}

impl KeyScheme {
    /// Builds a scheme from `(path pattern, scope template)` pairs.
    pub fn with_rules(rules: &[(&str, &str)]) -> Self {
        Self {
            rules: rules
                .iter()
                .map(|(pattern, scope)| ScopeRule::parse(pattern, scope))
                .collect(),
        }
    }

    /// Scope a request path belongs to.
    pub fn scope_for_path(&self, path: &str) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.resolve(path))
            .unwrap_or_else(|| format!("{FALLBACK_SCOPE}:{path}"))
    }

    /// Stable key for a read. Query pairs are sorted by name, then value.
    pub fn key_for_read(&self, method: &Method, path: &str, query: Option<&str>) -> String {
        let scope = self.scope_for_path(path);
        let query = canonical_query(query.unwrap_or(""));
        if query.is_empty() {
            format!("{scope}{SCOPE_SEPARATOR}{method} {path}")
        } else {
            format!("{scope}{SCOPE_SEPARATOR}{method} {path}?{query}")
        }
    }

    /// Everything a write on `resource` makes stale.
    pub fn invalidation_targets(&self, resource: &ResourceRef) -> Vec<InvalidationTarget> {
        match *resource {
            ResourceRef::Post { id } => vec![
                InvalidationTarget::scope(post_detail_scope(id)),
                InvalidationTarget::scope(post_comments_scope(id)),
                InvalidationTarget::scope(POSTS_LIST_SCOPE),
                InvalidationTarget::scope(POSTS_TRENDING_SCOPE),
            ],
            ResourceRef::Comment { post_id, .. } => vec![
                InvalidationTarget::scope(post_detail_scope(post_id)),
                InvalidationTarget::scope(post_comments_scope(post_id)),
                // Trending is ranked by comment count.
                InvalidationTarget::scope(POSTS_TRENDING_SCOPE),
            ],
        }
    }
}

/// Re-encodes a query string with its pairs in canonical order.
pub fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    pairs.sort();

    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
