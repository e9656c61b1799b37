//! # HTTP Route Handlers
//!
//! Service-level endpoints. The join order endpoint lives in [`crate::join_graph`].

use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}
