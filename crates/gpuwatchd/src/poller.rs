//! Occupancy poller.
//!
//! One long-lived task per process:
//!
//! ```text
//! SLEEP ──▶ QUERY ──▶ DIFF ──▶ BROADCAST ──▶ SLEEP
//!             │         └────▶ IDLE ──────▶ SLEEP
//!             └──▶ ERROR BROADCAST ───────▶ SLEEP
//! ```
//!
//! The sleep length is re-read from [`IntervalHandle`] at the start of
//! every cycle. A failed query is broadcast as plain text and never
//! replaces the last known good state.

use chrono::Local;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use gpuwatch_core::{status_report, DeviceError, OccupancyState};

use crate::broadcast::{BroadcastReport, Broadcaster};
use crate::device::{fetch_snapshots, SharedDevices};
use crate::interval::IntervalHandle;
use crate::transport::MessageFormat;

/// What a single poll cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// State differed from the previous cycle and was broadcast.
    Changed(BroadcastReport),
    Unchanged,
    /// The device query failed; the error text was broadcast.
    Failed {
        error: DeviceError,
        report: BroadcastReport,
    },
}

/// Queries the devices and renders their occupancy state.
pub async fn query_state(devices: &SharedDevices) -> Result<OccupancyState, DeviceError> {
    let snapshots = fetch_snapshots(devices).await?;
    Ok(OccupancyState::from_snapshots(&snapshots))
}

/// Polls devices and broadcasts occupancy changes.
pub struct Poller {
    devices: SharedDevices,
    broadcaster: Broadcaster,
    interval: IntervalHandle,
    /// Last successfully queried state; `None` until the first success.
    previous: Option<OccupancyState>,
}

impl Poller {
    pub fn new(devices: SharedDevices, broadcaster: Broadcaster, interval: IntervalHandle) -> Self {
        Self {
            devices,
            broadcaster,
            interval,
            previous: None,
        }
    }

    /// Last known good state.
    pub fn previous(&self) -> Option<&OccupancyState> {
        self.previous.as_ref()
    }

    /// Runs one QUERY/DIFF cycle without sleeping.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let state = match query_state(&self.devices).await {
            Ok(state) => state,
            Err(err) => {
                error!(error = %err, "GPU query failed");
                let report = self
                    .broadcaster
                    .broadcast(&err.to_string(), MessageFormat::Plain)
                    .await;
                return PollOutcome::Failed { error: err, report };
            }
        };

        if !state.differs_from(self.previous.as_ref()) {
            debug!(devices = state.len(), "Occupancy unchanged");
            self.previous = Some(state);
            return PollOutcome::Unchanged;
        }

        info!(devices = state.len(), "Occupancy changed");
        let text = status_report(&state, Local::now().naive_local());
        let report = self
            .broadcaster
            .broadcast(&text, MessageFormat::Markdown)
            .await;
        self.previous = Some(state);
        PollOutcome::Changed(report)
    }

    /// Sleeps and polls until `cancel_token` fires.
    pub async fn run(mut self, cancel_token: CancellationToken) {
        info!(interval = %self.interval.get(), "Poller started");

        loop {
            let pause = self.interval.get().as_duration();
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => break,
                _ = sleep(pause) => {}
            }

            self.poll_once().await;
        }

        info!("Poller stopped");
    }
}

/// Spawns the poller task.
pub fn spawn_poller(poller: Poller, cancel_token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(poller.run(cancel_token))
}
