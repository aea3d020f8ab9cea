use axum::Json;
use axum::response::IntoResponse;
use http::StatusCode;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Root handler for clients that only know the base URL
pub async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
