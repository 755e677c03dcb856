//! Capture session state machine
//!
//! Tracks one in-flight capture negotiation end-to-end:
//! `IDLE -> REQUESTED -> ACKED -> UPLOADED -> PUBLISHED`, with the ack
//! step optional. At most one session is live at a time; a new request
//! either coalesces into a still-fresh session or fully replaces it.

use super::types::{CaptureState, SessionSnapshot};
use crate::error::{Error, Result};

/// The single capture session
#[derive(Debug, Default)]
pub struct CaptureSession {
    token: Option<String>,
    state: CaptureState,
    ts_requested: Option<i64>,
    ts_acked: Option<i64>,
    ts_uploaded: Option<i64>,
    ts_published: Option<i64>,
    image_url: Option<String>,
}

impl CaptureSession {
    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// A session is fresh while its TTL has not elapsed and the device
    /// could still act on it (requested or acked).
    pub fn is_fresh(&self, now_ms: i64, ttl_ms: i64) -> bool {
        if !matches!(self.state, CaptureState::Requested | CaptureState::Acked) {
            return false;
        }
        match self.ts_requested {
            Some(requested) => now_ms - requested <= ttl_ms,
            None => false,
        }
    }

    /// A session is live while a device-side action is still expected
    pub fn is_live(&self) -> bool {
        matches!(
            self.state,
            CaptureState::Requested | CaptureState::Acked | CaptureState::Uploaded
        )
    }

    /// Start a brand-new negotiation, replacing whatever was here before
    pub fn begin(&mut self, token: String, now_ms: i64) {
        self.token = Some(token);
        self.state = CaptureState::Requested;
        self.ts_requested = Some(now_ms);
        self.ts_acked = None;
        self.ts_uploaded = None;
        self.ts_published = None;
        self.image_url = None;
    }

    /// Device acknowledgement. Only valid with the live token while the
    /// state is exactly REQUESTED.
    pub fn ack(&mut self, token: &str, now_ms: i64) -> Result<()> {
        if self.token.as_deref() == Some(token) && self.state == CaptureState::Requested {
            self.state = CaptureState::Acked;
            self.ts_acked = Some(now_ms);
            return Ok(());
        }
        Err(Error::Conflict("bad-token-or-state".to_string()))
    }

    /// Check that an upload with this token would be accepted, without
    /// mutating anything. The actual transition happens in
    /// [`complete_upload`](Self::complete_upload) only after the image is
    /// durably published, so a failed publish leaves the session intact.
    pub fn ensure_uploadable(&self, token: &str) -> Result<()> {
        let token_ok = self.token.as_deref() == Some(token);
        let state_ok = matches!(self.state, CaptureState::Requested | CaptureState::Acked);
        if token_ok && state_ok {
            Ok(())
        } else {
            Err(Error::Conflict("unexpected token/state".to_string()))
        }
    }

    /// Advance through UPLOADED to PUBLISHED after a successful publish
    pub fn complete_upload(&mut self, uploaded_ms: i64, published_ms: i64, image_url: String) {
        self.state = CaptureState::Published;
        self.ts_uploaded = Some(uploaded_ms);
        self.ts_published = Some(published_ms);
        self.image_url = Some(image_url);
    }

    /// Legacy token-less publish: force-advance the live session so legacy
    /// and token-aware clients observe consistent state.
    pub fn force_publish(&mut self, published_ms: i64, image_url: String) {
        self.state = CaptureState::Published;
        self.ts_published = Some(published_ms);
        self.image_url = Some(image_url);
    }

    pub fn snapshot(&self, latest_ts: i64) -> SessionSnapshot {
        SessionSnapshot {
            ok: true,
            token: self.token.clone(),
            state: self.state,
            ts_requested: self.ts_requested,
            ts_acked: self.ts_acked,
            ts_uploaded: self.ts_uploaded,
            ts_published: self.ts_published,
            image_url: self.image_url.clone(),
            latest_ts,
        }
    }
}
