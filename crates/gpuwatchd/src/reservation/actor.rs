//! Reservation actor - owns every memory block this process holds.
//!
//! The ReservationActor is the single owner of the reservation map. It
//! receives commands via an mpsc channel and processes them one at a
//! time, so two `/occ` on the same device can never race on the map.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Reply send failures are ignored (the requester went away)

use std::collections::BTreeMap;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use gpuwatch_core::{AllocationPlan, DeviceError, DeviceId, MemoryInfo};

use super::commands::{
    AllocationAttempt, OccupyReport, ReleaseOutcome, ReservationCommand, ReservationError,
};
use super::ReservationBackend;
use crate::device::{query_blocking, DeviceQuery, SharedDevices};

/// The reservation actor.
///
/// # Ownership
///
/// The actor owns:
/// - `backend`: the allocator that creates and frees device blocks
/// - `reservations`: device id → block handle, one entry per held device
///
/// An entry exists iff this process currently holds a block on that
/// device; other processes' usage is never recorded here.
///
/// The actor runs on its own OS thread, so allocator calls block that
/// thread and never a runtime worker. Device queries go back through the
/// runtime and are bounded by [`crate::device::QUERY_TIMEOUT`].
pub struct ReservationActor<B: ReservationBackend> {
    receiver: mpsc::Receiver<ReservationCommand>,
    runtime: Handle,
    devices: SharedDevices,
    backend: B,
    reservations: BTreeMap<DeviceId, B::Handle>,
}

impl<B: ReservationBackend> ReservationActor<B> {
    pub fn new(
        receiver: mpsc::Receiver<ReservationCommand>,
        runtime: Handle,
        devices: SharedDevices,
        backend: B,
    ) -> Self {
        Self {
            receiver,
            runtime,
            devices,
            backend,
            reservations: BTreeMap::new(),
        }
    }

    /// Runs the actor event loop until every handle is dropped.
    ///
    /// Blocks still held at shutdown are freed before returning. Must be
    /// called off the runtime, see [`super::spawn_reservations`].
    pub fn run(mut self) {
        info!("Reservation actor starting");

        while let Some(cmd) = self.receiver.blocking_recv() {
            self.handle_command(cmd);
        }

        let held = std::mem::take(&mut self.reservations);
        let count = held.len();
        for (device, handle) in held {
            self.backend.free(handle);
            self.backend.reset_device(device);
        }
        info!(released = count, "Reservation actor stopped");
    }

    fn handle_command(&mut self, cmd: ReservationCommand) {
        match cmd {
            ReservationCommand::Occupy {
                device,
                fraction,
                respond_to,
            } => {
                let result = self.handle_occupy(device, fraction);
                let _ = respond_to.send(result);
            }
            ReservationCommand::Release { device, respond_to } => {
                let result = self.handle_release(device);
                let _ = respond_to.send(result);
            }
            ReservationCommand::ListReserved { respond_to } => {
                let _ = respond_to.send(self.reservations.keys().copied().collect());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Runs a device query on the blocking pool and waits for it here.
    fn query<T, F>(&self, query: F) -> Result<T, DeviceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DeviceQuery) -> Result<T, DeviceError> + Send + 'static,
    {
        self.runtime.block_on(query_blocking(&self.devices, query))
    }

    fn device_count(&self) -> Result<u32, DeviceError> {
        self.query(|d| d.device_count())
    }

    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo, DeviceError> {
        self.query(move |d| d.memory_info(device))
    }

    fn check_device(&self, device: DeviceId) -> Result<(), ReservationError> {
        let count = self.device_count()?;
        if !device.is_valid_for(count) {
            return Err(ReservationError::InvalidDevice { device, count });
        }
        Ok(())
    }

    /// Allocates a share of the free memory, shrinking the request on failure.
    fn handle_occupy(
        &mut self,
        device: DeviceId,
        fraction: f64,
    ) -> Result<OccupyReport, ReservationError> {
        self.check_device(device)?;
        let free = self.memory_info(device)?.free;

        let mut attempts = Vec::new();
        for bytes in AllocationPlan::new(free, fraction) {
            match self.backend.allocate(device, bytes) {
                Ok(handle) => {
                    // A repeated /occ replaces the previous block
                    if let Some(previous) = self.reservations.insert(device, handle) {
                        debug!(device = %device, "Freeing replaced reservation");
                        self.backend.free(previous);
                    }
                    info!(device = %device, bytes, attempt = attempts.len() + 1, "Reserved device memory");
                    attempts.push(AllocationAttempt {
                        bytes,
                        result: Ok(()),
                    });
                    break;
                }
                Err(err) => {
                    warn!(device = %device, bytes, error = %err, "Allocation attempt failed");
                    attempts.push(AllocationAttempt {
                        bytes,
                        result: Err(err),
                    });
                }
            }
        }

        Ok(OccupyReport { device, attempts })
    }

    /// Releases one device or all devices. Unreserved devices are reported,
    /// not treated as errors.
    fn handle_release(
        &mut self,
        device: Option<DeviceId>,
    ) -> Result<Vec<ReleaseOutcome>, ReservationError> {
        let targets: Vec<DeviceId> = match device {
            Some(device) => {
                self.check_device(device)?;
                vec![device]
            }
            None => DeviceId::all(self.device_count()?).collect(),
        };

        let outcomes = targets
            .into_iter()
            .map(|device| match self.reservations.remove(&device) {
                Some(handle) => {
                    self.backend.free(handle);
                    self.backend.reset_device(device);
                    info!(device = %device, "Released device memory");
                    ReleaseOutcome::Released(device)
                }
                None => ReleaseOutcome::NotOccupied(device),
            })
            .collect();

        Ok(outcomes)
    }
}
