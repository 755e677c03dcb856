//! Application state
//!
//! Holds configuration and all shared components

use std::path::PathBuf;
use std::sync::Arc;

use crate::autocycle::AutocycleConfig;
use crate::capture_coordinator::CaptureCoordinator;
use crate::image_store::ImageStore;
use crate::meter_reader::MeterReader;

/// Application configuration (env driven)
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Directory for published images
    pub upload_dir: PathBuf,
    /// Directory with the dashboard static files
    pub static_dir: PathBuf,
    /// Capture request TTL in milliseconds
    pub capture_ttl_ms: i64,
    /// Whether the autocycle scheduler runs
    pub autocycle_enabled: bool,
    /// Autocycle cadence and quiet hours
    pub autocycle: AutocycleConfig,
    /// OpenAI-compatible API base URL
    pub openai_api_base: String,
    /// OpenAI API key (OCR disabled when absent)
    pub openai_api_key: Option<String>,
    /// Vision model name
    pub openai_model: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            static_dir: std::env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("static")),
            capture_ttl_ms: env_parse("CAPTURE_TTL_MS", 20_000),
            autocycle_enabled: std::env::var("AUTOCYCLE_ENABLED")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(true),
            autocycle: AutocycleConfig {
                min_interval_secs: env_parse("AUTOCYCLE_MIN_SECS", 1_800),
                max_interval_secs: env_parse("AUTOCYCLE_MAX_SECS", 3_600),
                quiet_start_hour: env_parse("QUIET_START_HOUR", 20),
                quiet_end_hour: env_parse("QUIET_END_HOUR", 9),
            },
            openai_api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Capture/relay coordination facade
    pub coordinator: Arc<CaptureCoordinator>,
    /// Latest-image publisher
    pub image_store: Arc<ImageStore>,
    /// Vision OCR adapter
    pub meter_reader: Arc<MeterReader>,
}
