//! Shared poll interval.
//!
//! `/set_interval` writes the interval; the poller reads it at the start
//! of every sleep, so a change applies from the next cycle on and never
//! cuts the current sleep short.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use gpuwatch_core::PollInterval;

/// Cheap-to-clone handle to the process-wide poll interval.
#[derive(Clone)]
pub struct IntervalHandle {
    sender: Arc<watch::Sender<PollInterval>>,
}

impl IntervalHandle {
    pub fn new(initial: PollInterval) -> Self {
        let (sender, _) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Current interval.
    pub fn get(&self) -> PollInterval {
        *self.sender.borrow()
    }

    /// Replaces the interval and returns the previous value.
    pub fn set(&self, interval: PollInterval) -> PollInterval {
        let previous = self.sender.send_replace(interval);
        info!(previous = %previous, current = %interval, "Poll interval changed");
        previous
    }
}

impl Default for IntervalHandle {
    fn default() -> Self {
        Self::new(PollInterval::default())
    }
}
