//! Client interface for interacting with the ReservationActor.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `ReservationError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use gpuwatch_core::DeviceId;

use super::commands::{OccupyReport, ReleaseOutcome, ReservationCommand, ReservationError};

/// Handle for interacting with the reservation actor.
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct ReservationHandle {
    sender: mpsc::Sender<ReservationCommand>,
}

impl ReservationHandle {
    pub fn new(sender: mpsc::Sender<ReservationCommand>) -> Self {
        Self { sender }
    }

    /// Reserve `fraction` of the device's free memory, with backoff.
    ///
    /// The returned report lists every attempt; check
    /// [`OccupyReport::allocated`] for success.
    ///
    /// # Errors
    ///
    /// - `ReservationError::InvalidDevice` if the device id is out of range
    /// - `ReservationError::Device` if the device could not be queried
    /// - `ReservationError::ChannelClosed` if the actor has shut down
    pub async fn occupy(
        &self,
        device: DeviceId,
        fraction: f64,
    ) -> Result<OccupyReport, ReservationError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(ReservationCommand::Occupy {
                device,
                fraction,
                respond_to: tx,
            })
            .await
            .map_err(|_| ReservationError::ChannelClosed)?;

        rx.await.map_err(|_| ReservationError::ChannelClosed)?
    }

    /// Release one device, or every device when `device` is `None`.
    ///
    /// # Errors
    ///
    /// - `ReservationError::InvalidDevice` if the device id is out of range
    /// - `ReservationError::Device` if the device count could not be read
    /// - `ReservationError::ChannelClosed` if the actor has shut down
    pub async fn release(
        &self,
        device: Option<DeviceId>,
    ) -> Result<Vec<ReleaseOutcome>, ReservationError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(ReservationCommand::Release {
                device,
                respond_to: tx,
            })
            .await
            .map_err(|_| ReservationError::ChannelClosed)?;

        rx.await.map_err(|_| ReservationError::ChannelClosed)?
    }

    /// Devices currently reserved by this process.
    ///
    /// Returns an empty list if the actor has shut down.
    pub async fn reserved(&self) -> Vec<DeviceId> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(ReservationCommand::ListReserved { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Returns true while the actor is running.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}
