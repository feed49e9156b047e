//! Requester identity taken from headers set by the upstream gateway.

use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::application::requester::Requester;
use crate::domain::types::Role;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// Resolves the requester; the role defaults to `user` when absent.
pub fn resolve_requester(headers: &HeaderMap) -> Result<Requester, ApiError> {
    let raw_id = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| ApiError::unauthorized(format!("missing `{USER_ID_HEADER}` header")))?;
    let id = raw_id
        .to_str()
        .ok()
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or_else(|| ApiError::unauthorized(format!("`{USER_ID_HEADER}` is not a UUID")))?;

    let role = match headers.get(USER_ROLE_HEADER) {
        None => Role::default(),
        Some(value) => value
            .to_str()
            .map_err(|_| ApiError::unauthorized(format!("`{USER_ROLE_HEADER}` is not text")))?
            .parse::<Role>()
            .map_err(ApiError::unauthorized)?,
    };

    Ok(Requester::new(id, role))
}

impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        resolve_requester(&parts.headers)
    }
}
