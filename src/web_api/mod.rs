//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - HTTP API routes for dashboard and device
//! - Request validation
//! - Response formatting

mod routes;

pub use routes::create_router;

use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "ts": Utc::now().timestamp_millis(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
