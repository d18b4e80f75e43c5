use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Handle /health endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Handle /ready endpoint
pub async fn readiness_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ready"})))
}
