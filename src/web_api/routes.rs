//! API Routes

use axum::{
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::state::AppState;

/// Maximum accepted raw upload body
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// No-store headers applied to latest-image responses to fight stale caching
const NOCACHE: [(&str, &str); 3] = [
    ("cache-control", "no-store, max-age=0"),
    ("pragma", "no-cache"),
    ("expires", "0"),
];

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Capture coordination (token flow + legacy sequence polling)
        .route("/api/watermeter/capture", post(capture_request))
        .route("/api/watermeter/capture/next", get(capture_next))
        .route("/api/watermeter/capture/ack", post(capture_ack))
        .route("/api/watermeter/capture/state", get(capture_state))
        .route("/api/watermeter/upload", post(upload_capture))
        // Relay activation channel
        .route("/api/relay/activate", post(relay_activate))
        .route("/api/relay/next", get(relay_next))
        // Meter OCR
        .route("/api/watermeter/analyze", post(analyze_meter))
        // Latest image
        .route("/api/watermeter/latest", get(latest_meta))
        .route("/latest.jpg", get(latest_jpg))
        // Legacy upload (no token)
        .route("/upload", post(upload_legacy))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SinceParams {
    #[serde(default, deserialize_with = "lenient_since")]
    since: u64,
}

/// Legacy pollers send whatever they last stored; a missing or garbled
/// `since` means "from the beginning", never a 400.
fn lenient_since<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0))
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    token: Option<String>,
}

// ========================================
// Capture Coordination Handlers
// ========================================

/// Dashboard requests a new capture from the device
async fn capture_request(State(state): State<AppState>) -> impl IntoResponse {
    let ticket = state.coordinator.request_capture().await;
    Json(ticket)
}

/// Device long-poll: has a capture been requested since `since`?
async fn capture_next(
    State(state): State<AppState>,
    Query(params): Query<SinceParams>,
) -> impl IntoResponse {
    let poll = state.coordinator.poll_capture(params.since).await;
    Json(poll)
}

/// Device acknowledges it is about to capture (token via query or JSON)
async fn capture_ack(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
    body: Option<Json<TokenBody>>,
) -> Result<impl IntoResponse> {
    let token = params
        .token
        .or_else(|| body.and_then(|Json(b)| b.token))
        .ok_or_else(|| Error::Validation("missing token".to_string()))?;

    state.coordinator.ack_capture(&token).await?;
    Ok(Json(json!({"ok": true})))
}

/// Device uploads the captured image (token flow)
async fn upload_capture(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut token = params.token;
    let mut image: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("bad multipart body: {}", e)))?
    {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("image") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("image read failed: {}", e)))?;
                image = Some(bytes.to_vec());
            }
            Some("token") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("token read failed: {}", e)))?;
                token = Some(text);
            }
            _ => {}
        }
    }

    let token = token.ok_or_else(|| Error::Validation("missing token or image".to_string()))?;
    let image = image.ok_or_else(|| Error::Validation("missing token or image".to_string()))?;
    if image.is_empty() {
        return Err(Error::Validation("empty file".to_string()));
    }

    let receipt = state.coordinator.upload_capture(&token, image).await?;
    Ok(Json(receipt))
}

/// Dashboard queries capture state for a token
async fn capture_state(
    State(state): State<AppState>,
    Query(params): Query<TokenParams>,
) -> Result<impl IntoResponse> {
    let token = params
        .token
        .ok_or_else(|| Error::Validation("missing token".to_string()))?;
    let snapshot = state.coordinator.query_capture_state(&token).await?;
    Ok(Json(snapshot))
}

// ========================================
// Relay Activation Handlers
// ========================================

/// Manually trigger a relay activation
async fn relay_activate(State(state): State<AppState>) -> impl IntoResponse {
    let activation = state.coordinator.request_relay().await;
    Json(activation)
}

/// Device long-poll: has a relay activation fired since `since`?
async fn relay_next(
    State(state): State<AppState>,
    Query(params): Query<SinceParams>,
) -> impl IntoResponse {
    let poll = state.coordinator.poll_relay(params.since).await;
    Json(poll)
}

// ========================================
// Meter OCR Handler
// ========================================

/// Analyze a meter image directly (no publish, no merge)
async fn analyze_meter(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse> {
    let mut image: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("bad multipart body: {}", e)))?
    {
        if field.name() == Some("image") {
            let filename = field.file_name().unwrap_or("upload.jpg").to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| Error::Validation(format!("image read failed: {}", e)))?;
            image = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        image.ok_or_else(|| Error::Validation("no file field 'image'".to_string()))?;
    if bytes.is_empty() {
        return Err(Error::Validation("empty file".to_string()));
    }

    let analysis = state.meter_reader.analyze(&bytes, &filename).await?;
    Ok(Json(analysis))
}

// ========================================
// Latest Image Handlers
// ========================================

/// Latest image metadata and URL for the UI
async fn latest_meta(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.coordinator.latest_meta().await;
    (NOCACHE, Json(status))
}

/// Serve the latest image with no-store caching
async fn latest_jpg(State(state): State<AppState>) -> impl IntoResponse {
    let path = state.image_store.latest_path();

    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            StatusCode::OK,
            [("content-type", "image/jpeg")],
            NOCACHE,
            bytes,
        )
            .into_response(),
        Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
            (StatusCode::NOT_FOUND, Json(json!({"error": "no image"}))).into_response()
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "Failed to read latest image");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": e.to_string()})),
            )
                .into_response()
        }
    }
}

// ========================================
// Legacy Upload Handler
// ========================================

/// Legacy upload endpoint (no token): multipart `image` or raw body bytes
async fn upload_legacy(State(state): State<AppState>, req: Request) -> Result<impl IntoResponse> {
    let is_multipart = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    let bytes = if is_multipart {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| Error::Validation(format!("bad multipart body: {}", e)))?;
        let mut image = Vec::new();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| Error::Validation(format!("bad multipart body: {}", e)))?
        {
            if field.name() == Some("image") {
                image = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("image read failed: {}", e)))?
                    .to_vec();
            }
        }
        image
    } else {
        axum::body::to_bytes(req.into_body(), MAX_UPLOAD_BYTES)
            .await
            .map_err(|e| Error::Validation(format!("body read failed: {}", e)))?
            .to_vec()
    };

    if bytes.is_empty() {
        return Err(Error::Validation("no image".to_string()));
    }

    let ts = state.coordinator.upload_legacy(bytes).await?;
    Ok(Json(json!({"ok": true, "ts": ts})))
}
