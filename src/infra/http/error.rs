use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::{AppError, ErrorReport};

use super::models::ApiEnvelope;

/// Failure rendered as `{ "success": false, "message": ... }`.
///
/// The attached [`ErrorReport`] keeps the full chain for logging and, outside
/// production, for the diagnostics middleware.
#[derive(Debug)]
pub struct ApiError {
    report: ErrorReport,
}

impl ApiError {
    pub fn from_app(source: &'static str, err: AppError) -> Self {
        let status = err.status_code();
        let message = err.presentation_message();
        Self {
            report: ErrorReport::from_error(source, status, message, &err),
        }
    }

    pub fn new(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            report: ErrorReport::from_message(source, status, message, detail),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(
            "infra::http::identity",
            StatusCode::UNAUTHORIZED,
            "Authentication required",
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.report.status
    }

    pub fn message(&self) -> &str {
        &self.report.public_message
    }
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self::from_app("infra::http", err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(
            "infra::http::json",
            rejection.status(),
            "Invalid request body",
            rejection.body_text(),
        )
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(
            "infra::http::query",
            StatusCode::BAD_REQUEST,
            "Invalid query parameters",
            rejection.body_text(),
        )
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(
            "infra::http::path",
            StatusCode::BAD_REQUEST,
            "Invalid identifier",
            rejection.body_text(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiEnvelope::<()>::failure(self.report.public_message.clone());
        let mut response = (self.report.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}
