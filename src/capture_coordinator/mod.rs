//! CaptureCoordinator - Capture Handshake Coordination
//!
//! ## Responsibilities
//!
//! - Own all shared coordination state under one lock
//! - Capture session state machine (token flow)
//! - Capture/relay sequence counters for long-polling devices
//! - Staleness (TTL) gating of the capture long-poll
//! - Atomic publish via ImageStore, OCR merge via MeterReader
//!
//! Every operation below is one critical section: check-then-mutate is
//! never observable half-done by a concurrent poll or state query. The
//! OCR call itself runs in a detached task outside the lock; only its
//! metadata merge re-enters, briefly.

mod sequence;
mod session;
mod types;

pub use types::*;

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::image_store::ImageStore;
use crate::meter_reader::MeterReader;
use sequence::SequenceCounter;
use session::CaptureSession;

/// Stable URL of the canonical latest image
const LATEST_URL: &str = "/latest.jpg";

/// All coordination state, guarded by a single mutex
#[derive(Default)]
struct CoordinatorInner {
    capture_seq: SequenceCounter,
    relay_seq: SequenceCounter,
    session: CaptureSession,
    latest: LatestImageMeta,
}

/// CaptureCoordinator instance
pub struct CaptureCoordinator {
    shared: Arc<Mutex<CoordinatorInner>>,
    store: Arc<ImageStore>,
    meter_reader: Arc<MeterReader>,
    ttl_ms: i64,
}

impl CaptureCoordinator {
    /// Create new CaptureCoordinator
    pub fn new(store: Arc<ImageStore>, meter_reader: Arc<MeterReader>, ttl_ms: i64) -> Self {
        Self {
            shared: Arc::new(Mutex::new(CoordinatorInner::default())),
            store,
            meter_reader,
            ttl_ms,
        }
    }

    /// Dashboard requests a capture.
    ///
    /// Bumps the capture counter always; coalesces into the live session
    /// while it is still fresh (duplicate clicks within the TTL never spawn
    /// competing tokens), otherwise starts a brand-new negotiation.
    pub async fn request_capture(&self) -> CaptureTicket {
        let now = now_ms();
        let mut inner = self.shared.lock().await;
        let seq = inner.capture_seq.bump();

        let token = if inner.session.is_fresh(now, self.ttl_ms) {
            let token = inner
                .session
                .token()
                .expect("fresh session always carries a token")
                .to_string();
            tracing::info!(seq = seq, token = %token, "Capture request coalesced");
            token
        } else {
            let token = new_token();
            inner.session.begin(token.clone(), now);
            tracing::info!(seq = seq, token = %token, "Capture requested");
            token
        };

        CaptureTicket {
            ok: true,
            seq,
            token,
        }
    }

    /// Device long-poll: is a capture needed?
    ///
    /// True only when the counter shows something newer than `since` AND
    /// the session is still fresh, so a device reconnecting after an
    /// outage does not re-trigger on a long-expired request.
    pub async fn poll_capture(&self, since: u64) -> CapturePoll {
        let now = now_ms();
        let inner = self.shared.lock().await;
        let capture = inner.capture_seq.has_newer(since) && inner.session.is_fresh(now, self.ttl_ms);
        let seq = inner.capture_seq.current();
        tracing::debug!(since = since, capture = capture, seq = seq, "Capture poll");
        CapturePoll { capture, seq }
    }

    /// Device acknowledges it is about to capture
    pub async fn ack_capture(&self, token: &str) -> Result<()> {
        let now = now_ms();
        let mut inner = self.shared.lock().await;
        inner.session.ack(token, now)?;
        tracing::info!(token = %token, "Capture acked");
        Ok(())
    }

    /// Device uploads the captured image (token flow).
    ///
    /// Publishes atomically and advances the session to PUBLISHED; a
    /// storage failure leaves both the session and the latest-image
    /// metadata exactly as before. The OCR merge is dispatched after the
    /// lock is released.
    pub async fn upload_capture(&self, token: &str, bytes: Vec<u8>) -> Result<PublishReceipt> {
        let receipt = {
            let mut inner = self.shared.lock().await;
            inner.session.ensure_uploadable(token)?;

            let uploaded_ms = now_ms();
            let ts = self.store.publish_capture(token, &bytes).await?;

            let image_url = self.store.capture_url(token);
            inner.session.complete_upload(uploaded_ms, ts, image_url.clone());
            inner.latest.ts = ts;

            tracing::info!(token = %token, ts = ts, "Image uploaded and published");
            PublishReceipt {
                ok: true,
                ts,
                image_url,
            }
        };

        self.spawn_analyze(bytes);
        Ok(receipt)
    }

    /// Legacy token-less upload: always replaces the latest image and
    /// force-advances any live session to PUBLISHED so both client
    /// generations observe consistent state.
    pub async fn upload_legacy(&self, bytes: Vec<u8>) -> Result<i64> {
        let ts = {
            let mut inner = self.shared.lock().await;
            let ts = self.store.publish_latest(&bytes).await?;
            inner.latest.ts = ts;

            if inner.session.is_live() {
                tracing::warn!(
                    token = ?inner.session.token(),
                    "Legacy upload force-advancing live session"
                );
                inner.session.force_publish(ts, LATEST_URL.to_string());
            }

            tracing::info!(ts = ts, "Legacy upload published");
            ts
        };

        self.spawn_analyze(bytes);
        Ok(ts)
    }

    /// Dashboard queries the session by token
    pub async fn query_capture_state(&self, token: &str) -> Result<SessionSnapshot> {
        let inner = self.shared.lock().await;
        if inner.session.token() == Some(token) {
            Ok(inner.session.snapshot(inner.latest.ts))
        } else {
            Err(Error::NotFound("unknown-token".to_string()))
        }
    }

    /// Trigger a relay activation (manual or autocycle)
    pub async fn request_relay(&self) -> RelayActivation {
        let mut inner = self.shared.lock().await;
        let seq = inner.relay_seq.bump();
        tracing::info!(seq = seq, "Relay activation requested");
        RelayActivation { ok: true, seq }
    }

    /// Device long-poll: is a relay activation needed?
    ///
    /// No staleness gate here: every bump is meant to be delivered
    /// whenever the poller next checks.
    pub async fn poll_relay(&self, since: u64) -> RelayPoll {
        let inner = self.shared.lock().await;
        RelayPoll {
            activate: inner.relay_seq.has_newer(since),
            seq: inner.relay_seq.current(),
        }
    }

    /// Latest-image status for the dashboard
    pub async fn latest_meta(&self) -> LatestStatus {
        let has_image = self.store.latest_exists();
        let inner = self.shared.lock().await;
        LatestStatus {
            has_image,
            image_url: has_image.then(|| LATEST_URL.to_string()),
            result: inner.latest.clone(),
        }
    }

    /// Fire-and-forget OCR pass over freshly published bytes.
    ///
    /// Failures are logged and swallowed; the uploader's response never
    /// waits on the vision model.
    fn spawn_analyze(&self, bytes: Vec<u8>) {
        if !self.meter_reader.is_configured() {
            tracing::debug!("Meter reader not configured, skipping OCR pass");
            return;
        }

        let reader = self.meter_reader.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            match reader.analyze(&bytes, "latest.jpg").await {
                Ok(analysis) => {
                    let mut inner = shared.lock().await;
                    inner.latest.merge(&analysis);
                    tracing::info!("OCR metadata merged into latest image");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Meter analysis failed after publish");
                }
            }
        });
    }
}

/// Short hex token correlating one capture end-to-end
fn new_token() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
