//! Command router and access control.
//!
//! Each inbound [`CommandEvent`] is checked against the whitelist,
//! validated, and dispatched to the reservation actor, the poll interval
//! or an on-demand device query. Replies always go back to the chat the
//! command came from; nothing here ever fails the caller.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};

use gpuwatch_core::{
    status_report, usage_message, DeviceId, PollInterval, DEFAULT_OCCUPY_FRACTION,
};
use gpuwatch_protocol::{reply, BotCommand, CommandEvent};

use crate::config::Whitelist;
use crate::device::{fetch_snapshots, query_blocking, SharedDevices};
use crate::interval::IntervalHandle;
use crate::poller::query_state;
use crate::reservation::{OccupyReport, ReleaseOutcome, ReservationError, ReservationHandle};
use crate::transport::{MessageFormat, Messenger};

/// One message to send back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub format: MessageFormat,
}

impl Reply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Plain,
        }
    }

    pub fn markdown(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            format: MessageFormat::Markdown,
        }
    }
}

/// Maps chat commands to their handlers.
#[derive(Clone)]
pub struct CommandRouter {
    whitelist: Arc<Whitelist>,
    devices: SharedDevices,
    reservations: ReservationHandle,
    interval: IntervalHandle,
    messenger: Arc<dyn Messenger>,
}

impl CommandRouter {
    pub fn new(
        whitelist: Arc<Whitelist>,
        devices: SharedDevices,
        reservations: ReservationHandle,
        interval: IntervalHandle,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            whitelist,
            devices,
            reservations,
            interval,
            messenger,
        }
    }

    /// Handles one command and sends every reply to its chat.
    pub async fn handle(&self, event: CommandEvent) {
        let replies = self.dispatch(&event).await;

        for reply in replies {
            if let Err(err) = self
                .messenger
                .send_message(event.chat, &reply.text, reply.format)
                .await
            {
                warn!(chat = %event.chat, command = %event.name, error = %err, "Failed to send reply");
            }
        }
    }

    /// Runs one command and returns the replies in send order.
    pub async fn dispatch(&self, event: &CommandEvent) -> Vec<Reply> {
        let sender = event.display_sender();
        let allowed = self.whitelist.contains(event.sender);

        if event.name.is_privileged() && !allowed {
            warn!(sender = %sender, id = %event.sender, command = %event.name, "Rejected non-whitelisted sender");
            return vec![Reply::plain(reply::not_whitelisted(event.sender))];
        }

        let command = match BotCommand::parse(event.name, &event.args) {
            Ok(command) => command,
            Err(err) => {
                debug!(sender = %sender, command = %event.name, error = %err, "Invalid arguments");
                return vec![Reply::plain(err.to_string())];
            }
        };

        info!(sender = %sender, command = %event.name, args = ?event.args, "Dispatching command");

        match command {
            BotCommand::Start if allowed => vec![Reply::plain(reply::welcome())],
            BotCommand::Start => vec![Reply::plain(reply::not_whitelisted(event.sender))],
            BotCommand::Gpu => self.full_status().await,
            BotCommand::Quick => self.quick_status().await,
            BotCommand::Occupy { device } => self.occupy(device).await,
            BotCommand::Release { device } => self.release(device).await,
            BotCommand::Echo { text } => vec![Reply::plain(text)],
            BotCommand::SetInterval { interval } => self.set_interval(interval),
        }
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    async fn full_status(&self) -> Vec<Reply> {
        match fetch_snapshots(&self.devices).await {
            Ok(snapshots) if snapshots.is_empty() => vec![Reply::plain(reply::no_devices())],
            Ok(snapshots) => snapshots
                .iter()
                .map(|snap| Reply::markdown(usage_message(snap.id, &snap.memory, &snap.processes)))
                .collect(),
            Err(err) => vec![Reply::plain(reply::device_failure(&err))],
        }
    }

    async fn quick_status(&self) -> Vec<Reply> {
        match query_state(&self.devices).await {
            Ok(state) => vec![Reply::markdown(status_report(
                &state,
                Local::now().naive_local(),
            ))],
            Err(err) => vec![Reply::plain(reply::device_failure(&err))],
        }
    }

    async fn occupy(&self, raw: i64) -> Vec<Reply> {
        let device = match self.resolve_device(raw).await {
            Ok(device) => device,
            Err(reply) => return vec![reply],
        };

        match self.reservations.occupy(device, DEFAULT_OCCUPY_FRACTION).await {
            Ok(report) => occupy_replies(&report),
            Err(err) => vec![reservation_error_reply(&err)],
        }
    }

    async fn release(&self, raw: Option<i64>) -> Vec<Reply> {
        let device = match raw {
            Some(raw) => match self.resolve_device(raw).await {
                Ok(device) => Some(device),
                Err(reply) => return vec![reply],
            },
            None => None,
        };

        match self.reservations.release(device).await {
            Ok(outcomes) => outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    ReleaseOutcome::Released(id) => Reply::plain(reply::released(id)),
                    ReleaseOutcome::NotOccupied(id) => Reply::plain(reply::not_occupied(id)),
                })
                .collect(),
            Err(err) => vec![reservation_error_reply(&err)],
        }
    }

    fn set_interval(&self, interval: PollInterval) -> Vec<Reply> {
        self.interval.set(interval);
        vec![Reply::plain(reply::interval_set(interval))]
    }

    /// Range-checks a user-supplied id against the live device count.
    async fn resolve_device(&self, raw: i64) -> Result<DeviceId, Reply> {
        let count = query_blocking(&self.devices, |d| d.device_count())
            .await
            .map_err(|err| Reply::plain(reply::device_failure(&err)))?;

        u32::try_from(raw)
            .ok()
            .map(DeviceId::new)
            .filter(|id| id.is_valid_for(count))
            .ok_or_else(|| Reply::plain(reply::invalid_device(count)))
    }
}

/// Progress and result lines for one occupy command.
fn occupy_replies(report: &OccupyReport) -> Vec<Reply> {
    let device = report.device;
    let mut replies = Vec::new();
    let mut last_error = None;

    for (index, attempt) in report.attempts.iter().enumerate() {
        match &attempt.result {
            Ok(()) => {
                replies.push(Reply::plain(reply::allocated(device, attempt.bytes)));
                return replies;
            }
            Err(err) => {
                if index + 1 < report.attempts.len() {
                    replies.push(Reply::plain(reply::allocation_retry(device, attempt.bytes)));
                }
                last_error = Some(err.to_string());
            }
        }
    }

    let reason = last_error.unwrap_or_else(|| "no allocation was attempted".to_string());
    replies.push(Reply::plain(reply::allocation_failed(
        device,
        report.attempts.len(),
        &reason,
    )));
    replies
}

fn reservation_error_reply(err: &ReservationError) -> Reply {
    match err {
        ReservationError::InvalidDevice { count, .. } => Reply::plain(reply::invalid_device(*count)),
        ReservationError::Device(err) => Reply::plain(reply::device_failure(err)),
        ReservationError::ChannelClosed => Reply::plain(reply::reservations_unavailable()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpuwatch_core::AllocationError;

    use crate::reservation::AllocationAttempt;

    fn oom(bytes: u64) -> AllocationAttempt {
        AllocationAttempt {
            bytes,
            result: Err(AllocationError::OutOfMemory {
                device: DeviceId::new(1),
                bytes,
                reason: "CUDA_ERROR_OUT_OF_MEMORY".into(),
            }),
        }
    }

    #[test]
    fn test_occupy_replies_after_retry() {
        let report = OccupyReport {
            device: DeviceId::new(1),
            attempts: vec![
                oom(1000),
                AllocationAttempt {
                    bytes: 800,
                    result: Ok(()),
                },
            ],
        };
        let texts: Vec<String> = occupy_replies(&report).into_iter().map(|r| r.text).collect();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("Could not allocate"));
        assert!(texts[1].starts_with("Allocated"));
    }

    #[test]
    fn test_occupy_replies_when_exhausted() {
        let report = OccupyReport {
            device: DeviceId::new(1),
            attempts: vec![oom(1000), oom(800), oom(640)],
        };
        let replies = occupy_replies(&report);
        assert_eq!(replies.len(), 3);
        let last = &replies[2].text;
        assert!(last.starts_with("Failed to occupy GPU 1 after 3 attempts"));
        assert!(last.contains("CUDA_ERROR_OUT_OF_MEMORY"));
    }

    #[test]
    fn test_reservation_error_replies() {
        let reply = reservation_error_reply(&ReservationError::InvalidDevice {
            device: DeviceId::new(5),
            count: 2,
        });
        assert_eq!(reply.text, "Invalid GPU ID. Must be between 0 and 1");
        assert_eq!(
            reservation_error_reply(&ReservationError::ChannelClosed).text,
            reply::reservations_unavailable()
        );
    }
}
