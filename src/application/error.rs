use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;
use tracing_error::SpanTrace;

use crate::{
    application::repos::RepoError, domain::error::DomainError, infra::error::InfraError,
};

/// Diagnostics attached to failed responses as an extension.
///
/// The response logger reads it for structured logs; outside production the
/// diagnostics middleware also exposes it in the body.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub public_message: String,
    pub messages: Vec<String>,
    pub span_trace: Option<String>,
}

impl ErrorReport {
    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            public_message: public_message.into(),
            messages,
            span_trace: capture_span_trace(),
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            public_message: public_message.into(),
            messages: vec![message.into()],
            span_trace: capture_span_trace(),
        }
    }

    /// First message of the chain, if any.
    pub fn detail(&self) -> Option<&str> {
        self.messages.first().map(String::as_str)
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

fn capture_span_trace() -> Option<String> {
    let rendered = SpanTrace::capture().to_string();
    (!rendered.trim().is_empty()).then_some(rendered)
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("not allowed to modify this {0}")]
    Forbidden(&'static str),
    #[error("requester identity missing or invalid")]
    Unauthorized,
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::Repo(RepoError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Domain(_)
            | AppError::Validation(_)
            | AppError::Repo(RepoError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            AppError::Repo(RepoError::Duplicate { .. } | RepoError::Integrity { .. }) => {
                StatusCode::CONFLICT
            }
            AppError::Repo(RepoError::Timeout) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Repo(RepoError::Persistence(_))
            | AppError::Infra(_)
            | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients.
    ///
    /// Client errors describe themselves; server errors stay generic.
    pub fn presentation_message(&self) -> String {
        match self {
            AppError::NotFound(entity) => format!("{} not found", capitalize(entity)),
            AppError::Repo(RepoError::NotFound) => "Resource not found".to_string(),
            AppError::Forbidden(entity) => format!("Not authorized to modify this {entity}"),
            AppError::Unauthorized => "Authentication required".to_string(),
            AppError::Domain(err) => err.to_string(),
            AppError::Validation(message) => message.clone(),
            AppError::Repo(RepoError::InvalidInput { .. }) => "Invalid input".to_string(),
            AppError::Repo(RepoError::Duplicate { .. }) => "Duplicate record".to_string(),
            AppError::Repo(RepoError::Integrity { .. }) => {
                "Integrity constraint violated".to_string()
            }
            AppError::Repo(RepoError::Timeout) | AppError::Infra(InfraError::Database { .. }) => {
                "Service temporarily unavailable".to_string()
            }
            AppError::Repo(RepoError::Persistence(_))
            | AppError::Infra(_)
            | AppError::Unexpected(_) => "Internal server error".to_string(),
        }
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(AppError::NotFound("post").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden("comment").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(DomainError::EmptyField { field: "content" }).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn presentation_messages_name_the_entity() {
        assert_eq!(AppError::NotFound("post").presentation_message(), "Post not found");
        assert_eq!(
            AppError::Forbidden("comment").presentation_message(),
            "Not authorized to modify this comment"
        );
    }

    #[test]
    fn server_errors_stay_generic() {
        let err = AppError::from(RepoError::Persistence("connection reset".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.presentation_message(), "Internal server error");
    }

    #[test]
    fn report_collects_the_source_chain() {
        let err = AppError::from(InfraError::Io(std::io::Error::other("disk gone")));
        let report = ErrorReport::from_error(
            "tests",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error",
            &err,
        );
        assert_eq!(report.detail(), Some("io error: disk gone"));
        assert!(report.messages.len() >= 2);
    }
}
