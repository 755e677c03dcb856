//! meterhub - Water Meter Dashboard Server
//!
//! Coordinates the "take a photo" handshake between the dashboard, a
//! long-polling camera device, and an autonomous scheduler.
//!
//! ## Architecture
//!
//! 1. CaptureCoordinator - session state machine, sequence counters, TTL
//! 2. ImageStore - atomic latest-image publishing
//! 3. MeterReader - vision OCR adapter (best-effort)
//! 4. AutocycleScheduler - jittered relay activations with quiet hours
//! 5. WebAPI - REST endpoints consumed by dashboard and device
//!
//! ## Design Principles
//!
//! - One lock: all coordination state lives behind the coordinator mutex
//! - No persistence: counters and session are process-lifetime only
//! - Conflicts are retry signals, never fatal errors

pub mod autocycle;
pub mod capture_coordinator;
pub mod error;
pub mod image_store;
pub mod meter_reader;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
