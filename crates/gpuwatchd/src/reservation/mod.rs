//! Device memory reservations using the Actor pattern.
//!
//! `/occ` grabs most of a device's free memory so nobody else starts a job
//! on it; `/rel` gives it back. The actor owns every block this process
//! holds and serializes all commands.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │  CommandRouter  │────▶│ ReservationActor │────▶│ ReservationBackend │
//! └─────────────────┘     └──────────────────┘     └────────────────────┘
//!         │                        │                         │
//!         │  ReservationCommand    │  BTreeMap<DeviceId,     │  allocate /
//!         │  (mpsc channel)        │  Handle>                │  free / reset
//!         ▼                        ▼                         ▼
//!    occupy / release        one entry per              CUDA driver
//!                            held device
//! ```

use std::thread;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::error;

use gpuwatch_core::{AllocationError, DeviceId};

use crate::device::SharedDevices;

mod actor;
mod commands;
#[cfg(feature = "cuda")]
mod cuda;
mod handle;

pub use actor::ReservationActor;
pub use commands::{
    AllocationAttempt, OccupyReport, ReleaseOutcome, ReservationCommand, ReservationError,
};
#[cfg(feature = "cuda")]
pub use cuda::CudaBackend;
pub use handle::ReservationHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 32;

/// Allocator for device memory blocks.
///
/// Implementations allocate real device memory; the actor only keeps the
/// returned handles.
pub trait ReservationBackend: Send + 'static {
    /// Owns one allocated block. Dropping it must not leak device memory.
    type Handle: Send + 'static;

    /// Allocates `bytes` on `device`.
    ///
    /// # Errors
    /// - `AllocationError::OutOfMemory` if the device cannot fit the block
    fn allocate(&mut self, device: DeviceId, bytes: u64) -> Result<Self::Handle, AllocationError>;

    /// Frees a block returned by [`ReservationBackend::allocate`].
    fn free(&mut self, handle: Self::Handle);

    /// Tears down this process's context on `device`.
    fn reset_device(&mut self, device: DeviceId);
}

/// Backend for builds without device memory support.
///
/// Every allocation fails with `AllocationError::Unsupported`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedBackend;

impl ReservationBackend for UnsupportedBackend {
    type Handle = ();

    fn allocate(&mut self, _device: DeviceId, _bytes: u64) -> Result<(), AllocationError> {
        Err(AllocationError::Unsupported)
    }

    fn free(&mut self, _handle: ()) {}

    fn reset_device(&mut self, _device: DeviceId) {}
}

/// Spawn the reservation actor on a dedicated thread and return a handle
/// for interaction.
///
/// Must be called from within a Tokio runtime; the actor borrows it for
/// bounded device queries. The actor stops once every handle is dropped,
/// freeing any blocks it still holds.
pub fn spawn_reservations<B: ReservationBackend>(
    devices: SharedDevices,
    backend: B,
) -> ReservationHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = ReservationActor::new(cmd_rx, Handle::current(), devices, backend);
    let spawned = thread::Builder::new()
        .name("gpuwatch-reservations".to_string())
        .spawn(move || actor.run());
    if let Err(err) = spawned {
        // The receiver went down with the closure, so every request on
        // this handle fails with ChannelClosed.
        error!(error = %err, "Failed to start reservation thread");
    }

    ReservationHandle::new(cmd_tx)
}

/// Spawn the reservation actor with the backend this build supports.
pub fn spawn_default_reservations(devices: SharedDevices) -> ReservationHandle {
    #[cfg(feature = "cuda")]
    {
        spawn_reservations(devices, CudaBackend::new())
    }

    #[cfg(not(feature = "cuda"))]
    {
        tracing::warn!("Built without the `cuda` feature; /occ will report failures");
        spawn_reservations(devices, UnsupportedBackend)
    }
}
