//! MeterReader - Vision OCR Adapter
//!
//! ## Responsibilities
//!
//! - Send meter images to an OpenAI-compatible vision model
//! - Coerce model output to structured JSON
//! - Degrade to a raw/warning payload when the model misbehaves
//!
//! The reader is a best-effort collaborator: publish paths never fail
//! because of it, and its latency stays outside the coordination lock.

mod types;

pub use types::*;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;

use crate::error::{Error, Result};

const INSTRUCTION: &str = "You are a utility meter OCR assistant. The image shows a mechanical \
water meter. Return ONLY strict JSON with keys: reading (string), confidence (0..1), notes \
(string). reading must include leading zeros and the decimal if present. If uncertain about a \
wheel transition, choose the most probable and lower confidence. \
Example: {\"reading\":\"01234.567\",\"confidence\":0.86,\"notes\":\"...\"}";

const NON_JSON_WARNING: &str = "Model did not return strict JSON; see 'raw'.";

/// MeterReader instance
pub struct MeterReader {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl MeterReader {
    /// Create new MeterReader
    pub fn new(api_base: String, api_key: Option<String>, model: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base,
            api_key,
            model,
        }
    }

    /// Whether an API key is available
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Analyze a meter image.
    ///
    /// Builds a base64 data URL (no temp files) and asks the model for a
    /// strict-JSON reading. Non-JSON model output degrades to
    /// [`MeterAnalysis::Unstructured`] rather than an error.
    pub async fn analyze(&self, image: &[u8], filename: &str) -> Result<MeterAnalysis> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Collaborator("OPENAI_API_KEY not set".to_string()))?;

        let ext = ext_from_name(filename);
        let data_url = format!("data:image/{};base64,{}", ext, BASE64.encode(image));

        let payload = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    {"type": "text", "text": INSTRUCTION},
                    {"type": "image_url", "image_url": {"url": data_url}},
                ],
            }],
        });

        let url = format!("{}/chat/completions", self.api_base.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Collaborator(format!("vision request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Collaborator(format!(
                "vision model returned {}: {}",
                status,
                body.trim()
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Collaborator(format!("vision response parse failed: {}", e)))?;

        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .trim()
            .to_string();

        Ok(Self::coerce(&text))
    }

    /// Coerce model text into a structured outcome
    fn coerce(text: &str) -> MeterAnalysis {
        if let Some(value) = coerce_json(text) {
            if value.get("reading").is_some() {
                if let Ok(reading) = serde_json::from_value::<MeterReading>(value) {
                    return MeterAnalysis::Reading(reading);
                }
            }
        }
        MeterAnalysis::Unstructured {
            raw: text.to_string(),
            warning: NON_JSON_WARNING.to_string(),
        }
    }
}

/// Normalized image extension for a filename (default jpeg)
fn ext_from_name(name: &str) -> &'static str {
    let name = name.to_ascii_lowercase();
    if name.ends_with("png") {
        "png"
    } else if name.ends_with("webp") {
        "webp"
    } else {
        // jpg/jpeg and everything else
        "jpeg"
    }
}

/// Attempt to parse model text as JSON.
///
/// Falls back to the outermost `{...}` block when the model wraps its JSON
/// in prose; returns None when no object can be extracted at all.
fn coerce_json(s: &str) -> Option<serde_json::Value> {
    if let Ok(v) = serde_json::from_str(s) {
        return Some(v);
    }
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&s[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_normalization() {
        assert_eq!(ext_from_name("meter.JPG"), "jpeg");
        assert_eq!(ext_from_name("meter.jpeg"), "jpeg");
        assert_eq!(ext_from_name("meter.png"), "png");
        assert_eq!(ext_from_name("meter.webp"), "webp");
        assert_eq!(ext_from_name("upload"), "jpeg");
    }

    #[test]
    fn coerce_strict_json() {
        let out = MeterReader::coerce(r#"{"reading":"00042.1","confidence":0.9,"notes":"ok"}"#);
        match out {
            MeterAnalysis::Reading(r) => {
                assert_eq!(r.reading, "00042.1");
                assert_eq!(r.confidence, 0.9);
            }
            _ => panic!("expected structured reading"),
        }
    }

    #[test]
    fn coerce_json_embedded_in_prose() {
        let out = MeterReader::coerce(
            "Sure! Here is the result: {\"reading\":\"00001\",\"confidence\":0.5,\"notes\":\"dim\"} Hope that helps.",
        );
        assert!(matches!(out, MeterAnalysis::Reading(_)));
    }

    #[test]
    fn coerce_garbage_falls_back_to_raw() {
        let out = MeterReader::coerce("the meter reads about forty two");
        match out {
            MeterAnalysis::Unstructured { raw, warning } => {
                assert_eq!(raw, "the meter reads about forty two");
                assert_eq!(warning, NON_JSON_WARNING);
            }
            _ => panic!("expected unstructured fallback"),
        }
    }

    #[test]
    fn json_without_reading_key_is_unstructured() {
        let out = MeterReader::coerce(r#"{"value": 42}"#);
        assert!(matches!(out, MeterAnalysis::Unstructured { .. }));
    }

    #[test]
    fn unstructured_serializes_flat() {
        let out = MeterAnalysis::Unstructured {
            raw: "x".to_string(),
            warning: "w".to_string(),
        };
        let v = serde_json::to_value(&out).unwrap();
        assert_eq!(v["raw"], "x");
        assert_eq!(v["warning"], "w");
        assert!(v.get("reading").is_none());
    }
}
