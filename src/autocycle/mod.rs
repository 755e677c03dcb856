//! AutocycleScheduler - Autonomous Relay Activation
//!
//! ## Responsibilities
//!
//! - Fire relay activations on a randomized cadence
//! - Quiet-hours blackout window (local time, may wrap midnight)
//! - Bounded sleep slices so shutdown and window boundaries are seen
//!   promptly rather than once per multi-minute sleep
//!
//! Time spent inside quiet hours does not count toward the jittered wait;
//! the countdown pauses until the window ends. A final re-check right
//! before firing closes the race where the window opens during the last
//! sleep slice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};
use rand::Rng;
use tokio::sync::RwLock;

use crate::capture_coordinator::CaptureCoordinator;

/// Upper bound on one sleep slice
const SLEEP_SLICE: Duration = Duration::from_secs(30);
/// Fixed backoff after a cycle error
const RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Autocycle cadence and blackout configuration
#[derive(Debug, Clone)]
pub struct AutocycleConfig {
    /// Lower bound of the random wait between fires (seconds)
    pub min_interval_secs: u64,
    /// Upper bound of the random wait between fires (seconds)
    pub max_interval_secs: u64,
    /// Local hour at which the blackout starts
    pub quiet_start_hour: u32,
    /// Local hour at which the blackout ends (exclusive)
    pub quiet_end_hour: u32,
}

/// AutocycleScheduler instance
pub struct AutocycleScheduler {
    coordinator: Arc<CaptureCoordinator>,
    config: AutocycleConfig,
    running: Arc<RwLock<bool>>,
}

impl AutocycleScheduler {
    /// Create new AutocycleScheduler
    pub fn new(coordinator: Arc<CaptureCoordinator>, config: AutocycleConfig) -> Self {
        Self {
            coordinator,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Start the background loop
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            if *running {
                tracing::warn!("Autocycle already running");
                return;
            }
            *running = true;
        }

        tracing::info!(
            min_secs = self.config.min_interval_secs,
            max_secs = self.config.max_interval_secs,
            quiet_start = self.config.quiet_start_hour,
            quiet_end = self.config.quiet_end_hour,
            "Starting autocycle scheduler"
        );

        tokio::spawn(async move {
            loop {
                if !*self.running.read().await {
                    break;
                }

                if let Err(e) = self.cycle().await {
                    tracing::error!(error = %e, "Autocycle cycle error");
                    tokio::time::sleep(RETRY_BACKOFF).await;
                }
            }

            tracing::info!("Autocycle scheduler stopped");
        });
    }

    /// Stop the background loop (observed within one sleep slice)
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
        tracing::info!("Stopping autocycle scheduler");
    }

    /// One wait-then-fire cycle
    async fn cycle(&self) -> crate::Result<()> {
        let wait = self.roll_wait();
        tracing::debug!(wait_secs = wait.as_secs(), "Autocycle armed");

        let mut remaining = wait;
        while remaining > Duration::ZERO {
            if !*self.running.read().await {
                return Ok(());
            }

            if self.in_quiet_hours_now() {
                // Countdown is paused; this slice does not count
                tokio::time::sleep(SLEEP_SLICE).await;
                continue;
            }

            let slice = remaining.min(SLEEP_SLICE);
            tokio::time::sleep(slice).await;
            remaining = remaining.saturating_sub(slice);
        }

        // The window may have opened during the final slice
        if self.in_quiet_hours_now() {
            tracing::info!("Quiet hours active at fire time, skipping cycle");
            return Ok(());
        }

        let activation = self.coordinator.request_relay().await;
        tracing::info!(seq = activation.seq, "Autocycle fired relay activation");
        Ok(())
    }

    /// Roll a uniform random wait in [min, max]
    fn roll_wait(&self) -> Duration {
        let min = self.config.min_interval_secs;
        let max = self.config.max_interval_secs.max(min);
        let secs = rand::thread_rng().gen_range(min..=max);
        Duration::from_secs(secs)
    }

    fn in_quiet_hours_now(&self) -> bool {
        in_quiet_hours(
            Local::now().hour(),
            self.config.quiet_start_hour,
            self.config.quiet_end_hour,
        )
    }
}

/// Whether `hour` falls inside the blackout window.
///
/// `start > end` wraps past midnight (start..24 plus 0..end); `start ==
/// end` means the window is disabled. Start is inclusive, end exclusive.
pub fn in_quiet_hours(hour: u32, start: u32, end: u32) -> bool {
    if start == end {
        false
    } else if start < end {
        hour >= start && hour < end
    } else {
        hour >= start || hour < end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_window() {
        // 01:00-06:00
        assert!(!in_quiet_hours(0, 1, 6));
        assert!(in_quiet_hours(1, 1, 6));
        assert!(in_quiet_hours(5, 1, 6));
        assert!(!in_quiet_hours(6, 1, 6));
        assert!(!in_quiet_hours(12, 1, 6));
    }

    #[test]
    fn window_wrapping_midnight() {
        // 20:00-09:00 (the default blackout)
        assert!(in_quiet_hours(20, 20, 9));
        assert!(in_quiet_hours(21, 20, 9));
        assert!(in_quiet_hours(23, 20, 9));
        assert!(in_quiet_hours(0, 20, 9));
        assert!(in_quiet_hours(8, 20, 9));
        assert!(!in_quiet_hours(9, 20, 9));
        assert!(!in_quiet_hours(12, 20, 9));
        assert!(!in_quiet_hours(19, 20, 9));
    }

    #[test]
    fn equal_bounds_disable_the_window() {
        for hour in 0..24 {
            assert!(!in_quiet_hours(hour, 7, 7));
        }
    }

    async fn test_scheduler(dir: &tempfile::TempDir, config: AutocycleConfig) -> AutocycleScheduler {
        let store = Arc::new(
            crate::image_store::ImageStore::new(dir.path().to_path_buf())
                .await
                .unwrap(),
        );
        let reader = Arc::new(crate::meter_reader::MeterReader::new(
            "http://localhost:0/v1".to_string(),
            None,
            "gpt-4o-mini".to_string(),
        ));
        let coordinator = Arc::new(CaptureCoordinator::new(store, reader, 20_000));
        AutocycleScheduler::new(coordinator, config)
    }

    #[tokio::test]
    async fn roll_wait_stays_within_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let scheduler = test_scheduler(
            &dir,
            AutocycleConfig {
                min_interval_secs: 10,
                max_interval_secs: 20,
                quiet_start_hour: 20,
                quiet_end_hour: 9,
            },
        )
        .await;

        for _ in 0..50 {
            let wait = scheduler.roll_wait();
            assert!(wait >= Duration::from_secs(10));
            assert!(wait <= Duration::from_secs(20));
        }
    }

    #[tokio::test]
    async fn cycle_fires_outside_quiet_hours() {
        let dir = tempfile::tempdir().unwrap();
        // Blackout two hours away from now, so the fire goes through
        let hour = Local::now().hour();
        let scheduler = test_scheduler(
            &dir,
            AutocycleConfig {
                min_interval_secs: 0,
                max_interval_secs: 0,
                quiet_start_hour: (hour + 2) % 24,
                quiet_end_hour: (hour + 3) % 24,
            },
        )
        .await;

        scheduler.cycle().await.unwrap();

        let poll = scheduler.coordinator.poll_relay(0).await;
        assert!(poll.activate);
        assert_eq!(poll.seq, 1);
    }

    #[tokio::test]
    async fn quiet_hours_suppress_the_fire() {
        let dir = tempfile::tempdir().unwrap();
        // Blackout covering the current hour; zero wait hits the
        // pre-fire re-check immediately
        let hour = Local::now().hour();
        let scheduler = test_scheduler(
            &dir,
            AutocycleConfig {
                min_interval_secs: 0,
                max_interval_secs: 0,
                quiet_start_hour: hour,
                quiet_end_hour: (hour + 1) % 24,
            },
        )
        .await;

        scheduler.cycle().await.unwrap();

        let poll = scheduler.coordinator.poll_relay(0).await;
        assert!(!poll.activate);
        assert_eq!(poll.seq, 0);
    }
}
