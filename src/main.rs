//! meterhub - Water Meter Dashboard Server
//!
//! Main entry point.

use std::sync::Arc;

use meterhub::{
    autocycle::AutocycleScheduler,
    capture_coordinator::CaptureCoordinator,
    image_store::ImageStore,
    meter_reader::MeterReader,
    state::{AppConfig, AppState},
    web_api,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meterhub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting meterhub v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        upload_dir = %config.upload_dir.display(),
        static_dir = %config.static_dir.display(),
        capture_ttl_ms = config.capture_ttl_ms,
        autocycle_enabled = config.autocycle_enabled,
        ocr_configured = config.openai_api_key.is_some(),
        "Configuration loaded"
    );

    // Initialize components
    let image_store = Arc::new(ImageStore::new(config.upload_dir.clone()).await?);
    tracing::info!("ImageStore initialized");

    let meter_reader = Arc::new(MeterReader::new(
        config.openai_api_base.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    ));
    if !meter_reader.is_configured() {
        tracing::warn!("OPENAI_API_KEY not set, meter OCR disabled");
    }

    let coordinator = Arc::new(CaptureCoordinator::new(
        image_store.clone(),
        meter_reader.clone(),
        config.capture_ttl_ms,
    ));
    tracing::info!("CaptureCoordinator initialized");

    // Start autocycle scheduler background task
    if config.autocycle_enabled {
        let scheduler = Arc::new(AutocycleScheduler::new(
            coordinator.clone(),
            config.autocycle.clone(),
        ));
        scheduler.start().await;
    } else {
        tracing::info!("Autocycle scheduler disabled (AUTOCYCLE_ENABLED=false)");
    }

    // Create application state
    let state = AppState {
        config: config.clone(),
        coordinator,
        image_store,
        meter_reader,
    };

    // Create router with static dashboard + published image serving
    let serve_static = ServeDir::new(&config.static_dir)
        .not_found_service(ServeFile::new(config.static_dir.join("index.html")));

    let app = web_api::create_router(state)
        .nest_service("/uploads", ServeDir::new(&config.upload_dir))
        .fallback_service(serve_static)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
