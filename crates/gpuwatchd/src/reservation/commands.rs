//! Reservation actor commands, errors, and outcomes.
//!
//! This module defines the message types for communicating with the
//! `ReservationActor`:
//! - `ReservationCommand`: Commands sent to the actor
//! - `ReservationError`: Errors that end a command before any allocation
//! - `OccupyReport` / `ReleaseOutcome`: What a command did

use gpuwatch_core::{AllocationError, DeviceError, DeviceId};
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Reservation Commands
// ============================================================================

/// Commands sent to the reservation actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum ReservationCommand {
    /// Reserve a share of a device's free memory.
    ///
    /// # Errors
    /// - `ReservationError::InvalidDevice` if the id is out of range
    /// - `ReservationError::Device` if free memory could not be read
    Occupy {
        device: DeviceId,
        /// Share of free memory requested on the first attempt
        fraction: f64,
        respond_to: oneshot::Sender<Result<OccupyReport, ReservationError>>,
    },

    /// Release one device, or every device when `device` is `None`.
    ///
    /// # Errors
    /// - `ReservationError::InvalidDevice` if the id is out of range
    /// - `ReservationError::Device` if the device count could not be read
    Release {
        device: Option<DeviceId>,
        respond_to: oneshot::Sender<Result<Vec<ReleaseOutcome>, ReservationError>>,
    },

    /// List devices currently reserved by this process.
    ListReserved {
        respond_to: oneshot::Sender<Vec<DeviceId>>,
    },
}

// ============================================================================
// Reservation Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// Device id outside `[0, device_count)`.
    #[error("invalid GPU {device} (device count: {count})")]
    InvalidDevice { device: DeviceId, count: u32 },

    /// The device layer failed before an allocation was attempted.
    #[error("device query failed: {0}")]
    Device(#[from] DeviceError),

    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Outcomes
// ============================================================================

/// A single allocation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationAttempt {
    pub bytes: u64,
    pub result: Result<(), AllocationError>,
}

/// Result of an occupy command: every attempt, in order.
///
/// At most the last attempt succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupyReport {
    pub device: DeviceId,
    pub attempts: Vec<AllocationAttempt>,
}

impl OccupyReport {
    /// Bytes held after the command, if any attempt succeeded.
    pub fn allocated(&self) -> Option<u64> {
        self.attempts
            .iter()
            .find(|attempt| attempt.result.is_ok())
            .map(|attempt| attempt.bytes)
    }

    /// Requested sizes in attempt order.
    pub fn requested(&self) -> Vec<u64> {
        self.attempts.iter().map(|attempt| attempt.bytes).collect()
    }
}

/// Result of releasing one device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released(DeviceId),
    /// Nothing was reserved on the device. Not an error.
    NotOccupied(DeviceId),
}
