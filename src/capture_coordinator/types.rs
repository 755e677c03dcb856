//! Capture coordination wire types

use serde::{Deserialize, Serialize};

use crate::meter_reader::MeterAnalysis;

/// Capture session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CaptureState {
    #[default]
    Idle,
    Requested,
    Acked,
    Uploaded,
    Published,
}

/// Response to a dashboard capture request
#[derive(Debug, Clone, Serialize)]
pub struct CaptureTicket {
    pub ok: bool,
    /// Capture sequence value after this request (legacy polling clients)
    pub seq: u64,
    /// Token for the token-based flow (fresh or coalesced)
    pub token: String,
}

/// Device poll answer for the capture channel
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapturePoll {
    /// True when a newer request exists and the session is still fresh
    pub capture: bool,
    pub seq: u64,
}

/// Response to a relay activation trigger
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RelayActivation {
    pub ok: bool,
    pub seq: u64,
}

/// Device poll answer for the relay channel
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RelayPoll {
    pub activate: bool,
    pub seq: u64,
}

/// Result of a successful token-based upload
#[derive(Debug, Clone, Serialize)]
pub struct PublishReceipt {
    pub ok: bool,
    /// Millisecond publish timestamp (cache busting)
    pub ts: i64,
    pub image_url: String,
}

/// Point-in-time view of the capture session for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub ok: bool,
    pub token: Option<String>,
    pub state: CaptureState,
    pub ts_requested: Option<i64>,
    pub ts_acked: Option<i64>,
    pub ts_uploaded: Option<i64>,
    pub ts_published: Option<i64>,
    pub image_url: Option<String>,
    pub latest_ts: i64,
}

/// Metadata of the most recently published image
///
/// Mutated only by the publish path (`ts`) and the OCR merge (the rest).
#[derive(Debug, Clone, Default, Serialize)]
pub struct LatestImageMeta {
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl LatestImageMeta {
    /// Fold an OCR result into the metadata.
    ///
    /// A successful reading overwrites `reading`/`confidence`/`notes` and
    /// clears any previous warning. `raw` is only set when no raw value is
    /// present yet, so the first diagnostic text seen is preserved.
    pub fn merge(&mut self, analysis: &MeterAnalysis) {
        match analysis {
            MeterAnalysis::Reading(r) => {
                self.reading = Some(r.reading.clone());
                self.confidence = Some(r.confidence);
                self.notes = r.notes.clone();
                self.warning = None;
            }
            MeterAnalysis::Unstructured { raw, warning } => {
                self.warning = Some(warning.clone());
                if self.raw.is_none() {
                    self.raw = Some(raw.clone());
                }
            }
        }
    }
}

/// Latest-image status for the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct LatestStatus {
    #[serde(rename = "hasImage")]
    pub has_image: bool,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub result: LatestImageMeta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meter_reader::MeterReading;

    #[test]
    fn merge_reading_overwrites_and_clears_warning() {
        let mut meta = LatestImageMeta {
            ts: 1,
            warning: Some("old warning".to_string()),
            ..Default::default()
        };

        meta.merge(&MeterAnalysis::Reading(MeterReading {
            reading: "01234.567".to_string(),
            confidence: 0.86,
            notes: Some("clear dial".to_string()),
        }));

        assert_eq!(meta.reading.as_deref(), Some("01234.567"));
        assert_eq!(meta.confidence, Some(0.86));
        assert_eq!(meta.notes.as_deref(), Some("clear dial"));
        assert!(meta.warning.is_none());
    }

    #[test]
    fn merge_keeps_first_raw_value() {
        let mut meta = LatestImageMeta::default();

        meta.merge(&MeterAnalysis::Unstructured {
            raw: "first".to_string(),
            warning: "w1".to_string(),
        });
        meta.merge(&MeterAnalysis::Unstructured {
            raw: "second".to_string(),
            warning: "w2".to_string(),
        });

        assert_eq!(meta.raw.as_deref(), Some("first"));
        assert_eq!(meta.warning.as_deref(), Some("w2"));
    }

    #[test]
    fn capture_state_serializes_uppercase() {
        let s = serde_json::to_string(&CaptureState::Requested).unwrap();
        assert_eq!(s, "\"REQUESTED\"");
    }
}
