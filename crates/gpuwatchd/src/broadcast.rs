//! Broadcast dispatcher.
//!
//! Sends one message to every whitelisted subscriber. A failed delivery
//! is logged and recorded, and delivery continues with the next
//! recipient; no error ever leaves [`Broadcaster::broadcast`].

use std::sync::Arc;

use tracing::{debug, warn};

use gpuwatch_protocol::ChatId;

use crate::config::Whitelist;
use crate::transport::{DeliveryError, MessageFormat, Messenger};

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: Vec<ChatId>,
    pub failed: Vec<DeliveryError>,
}

impl BroadcastReport {
    #[must_use]
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Fans messages out to the whitelist.
#[derive(Clone)]
pub struct Broadcaster {
    messenger: Arc<dyn Messenger>,
    whitelist: Arc<Whitelist>,
}

impl Broadcaster {
    pub fn new(messenger: Arc<dyn Messenger>, whitelist: Arc<Whitelist>) -> Self {
        Self {
            messenger,
            whitelist,
        }
    }

    /// Sends `text` to every subscriber in whitelist order.
    pub async fn broadcast(&self, text: &str, format: MessageFormat) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for recipient in self.whitelist.iter() {
            match self.messenger.send_message(recipient, text, format).await {
                Ok(()) => report.delivered.push(recipient),
                Err(err) => {
                    warn!(recipient = %recipient, error = %err, "Broadcast delivery failed");
                    report.failed.push(err);
                }
            }
        }

        debug!(
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Broadcast complete"
        );
        report
    }
}
