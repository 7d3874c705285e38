//! CUDA reservation backend.

use std::collections::HashMap;
use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice};
use tracing::debug;

use gpuwatch_core::{AllocationError, DeviceId};

use super::ReservationBackend;

/// Allocates zero-filled byte buffers through the CUDA driver API.
///
/// One primary context is opened per device on first use and dropped on
/// reset.
#[derive(Default)]
pub struct CudaBackend {
    contexts: HashMap<DeviceId, Arc<CudaDevice>>,
}

impl CudaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&mut self, device: DeviceId) -> Result<Arc<CudaDevice>, AllocationError> {
        if let Some(ctx) = self.contexts.get(&device) {
            return Ok(Arc::clone(ctx));
        }

        let ctx = CudaDevice::new(device.index() as usize).map_err(|e| {
            AllocationError::DeviceOpen {
                device,
                reason: format!("{e:?}"),
            }
        })?;
        debug!(device = %device, "Opened CUDA context");
        self.contexts.insert(device, Arc::clone(&ctx));
        Ok(ctx)
    }
}

impl ReservationBackend for CudaBackend {
    type Handle = CudaSlice<u8>;

    fn allocate(&mut self, device: DeviceId, bytes: u64) -> Result<CudaSlice<u8>, AllocationError> {
        let ctx = self.context(device)?;
        ctx.alloc_zeros::<u8>(bytes as usize)
            .map_err(|e| AllocationError::OutOfMemory {
                device,
                bytes,
                reason: format!("{e:?}"),
            })
    }

    fn free(&mut self, handle: CudaSlice<u8>) {
        drop(handle);
    }

    fn reset_device(&mut self, device: DeviceId) {
        if self.contexts.remove(&device).is_some() {
            debug!(device = %device, "Released CUDA context");
        }
    }
}
