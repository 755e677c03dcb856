//! Meter OCR result types

use serde::{Deserialize, Serialize};

/// Structured reading returned by the vision model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterReading {
    /// Meter value including leading zeros and decimal if present
    pub reading: String,
    /// Model confidence in 0..1
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Outcome of one analyze call.
///
/// Serializes flat: either `{"reading", "confidence", "notes"}` or the
/// `{"raw", "warning"}` fallback when the model did not return strict JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MeterAnalysis {
    Reading(MeterReading),
    Unstructured { raw: String, warning: String },
}
