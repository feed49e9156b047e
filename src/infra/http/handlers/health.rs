use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::http::error::ApiError;
use crate::infra::http::models::ApiEnvelope;
use crate::infra::http::state::HttpState;

pub async fn health(State(state): State<HttpState>) -> Result<Json<ApiEnvelope<Value>>, ApiError> {
    let storage = match &state.db {
        Some(db) => {
            db.health_check().await.map_err(|err| {
                warn!(error = %err, "database health check failed");
                ApiError::new(
                    "infra::http::health",
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Database unavailable",
                    err.to_string(),
                )
            })?;
            "postgres"
        }
        None => "memory",
    };

    Ok(Json(ApiEnvelope::ok(json!({
        "status": "ok",
        "storage": storage,
        "cache": state.cache.config().enabled,
    }))))
}
