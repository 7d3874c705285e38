//! Device query adapter.
//!
//! The daemon reads devices only through [`DeviceQuery`]. Every call
//! reflects live driver state; nothing is cached between calls.
//!
//! # Async Safety
//!
//! Driver calls block, so async callers go through [`query_blocking`],
//! which runs the query on the blocking pool and bounds it with
//! [`QUERY_TIMEOUT`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use gpuwatch_core::{DeviceError, DeviceId, DeviceSnapshot, MemoryInfo, ProcessInfo};
use tokio::time::timeout;
use tracing::warn;

#[cfg(feature = "nvml")]
mod nvml;

#[cfg(feature = "nvml")]
pub use nvml::NvmlDevices;

/// Upper bound for a single blocking query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Read access to the host's accelerator devices.
pub trait DeviceQuery: Send + Sync {
    /// Number of devices currently visible.
    fn device_count(&self) -> Result<u32, DeviceError>;

    /// Memory statistics of one device.
    ///
    /// # Errors
    /// - `DeviceError::InvalidDevice` if `device` is out of range
    /// - `DeviceError::QueryFailed` if the driver call fails
    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo, DeviceError>;

    /// Processes holding a context on one device.
    fn running_processes(&self, device: DeviceId) -> Result<Vec<ProcessInfo>, DeviceError>;
}

/// Shared handle to the device adapter.
pub type SharedDevices = Arc<dyn DeviceQuery>;

/// Opens the device library this build was compiled with.
pub fn open_devices() -> Result<SharedDevices, DeviceError> {
    #[cfg(feature = "nvml")]
    {
        Ok(Arc::new(NvmlDevices::init()?))
    }

    #[cfg(not(feature = "nvml"))]
    {
        Err(DeviceError::Unavailable(
            "gpuwatchd was built without the `nvml` feature".to_string(),
        ))
    }
}

/// Queries memory and processes of every device, in device order.
///
/// Fails on the first device error; a partial snapshot is never returned.
pub fn snapshot_all(devices: &dyn DeviceQuery) -> Result<Vec<DeviceSnapshot>, DeviceError> {
    let count = devices.device_count()?;
    DeviceId::all(count)
        .map(|id| {
            Ok(DeviceSnapshot {
                id,
                memory: devices.memory_info(id)?,
                processes: devices.running_processes(id)?,
            })
        })
        .collect()
}

/// Runs a blocking query on the blocking pool, bounded by [`QUERY_TIMEOUT`].
pub async fn query_blocking<T, F>(devices: &SharedDevices, query: F) -> Result<T, DeviceError>
where
    T: Send + 'static,
    F: FnOnce(&dyn DeviceQuery) -> Result<T, DeviceError> + Send + 'static,
{
    let devices = Arc::clone(devices);
    let task = tokio::task::spawn_blocking(move || query(devices.as_ref()));

    match timeout(QUERY_TIMEOUT, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "Device query task failed");
            Err(DeviceError::Unavailable(format!("query task failed: {join_err}")))
        }
        Err(_) => Err(DeviceError::Timeout {
            secs: QUERY_TIMEOUT.as_secs(),
        }),
    }
}

/// Snapshots every device without blocking the runtime.
pub async fn fetch_snapshots(devices: &SharedDevices) -> Result<Vec<DeviceSnapshot>, DeviceError> {
    query_blocking(devices, |d| snapshot_all(d)).await
}

// ============================================================================
// Static Devices
// ============================================================================

/// In-memory device adapter with scripted contents.
///
/// Used by tests and for running the bot on hosts without a GPU driver.
/// Contents can be swapped at any time, and a failure can be injected
/// that every subsequent query returns until cleared.
#[derive(Debug, Default)]
pub struct StaticDevices {
    devices: Mutex<Vec<DeviceSnapshot>>,
    failure: Mutex<Option<DeviceError>>,
}

impl StaticDevices {
    pub fn new(devices: Vec<DeviceSnapshot>) -> Self {
        Self {
            devices: Mutex::new(devices),
            failure: Mutex::new(None),
        }
    }

    /// Replaces every device snapshot.
    pub fn set_devices(&self, devices: Vec<DeviceSnapshot>) {
        *lock(&self.devices) = devices;
    }

    /// Makes every query fail with `err` until [`StaticDevices::recover`].
    pub fn fail_with(&self, err: DeviceError) {
        *lock(&self.failure) = Some(err);
    }

    pub fn recover(&self) {
        *lock(&self.failure) = None;
    }

    fn check(&self) -> Result<(), DeviceError> {
        match lock(&self.failure).as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn with_device<T>(
        &self,
        device: DeviceId,
        f: impl FnOnce(&DeviceSnapshot) -> T,
    ) -> Result<T, DeviceError> {
        self.check()?;
        let devices = lock(&self.devices);
        devices
            .iter()
            .find(|snap| snap.id == device)
            .map(f)
            .ok_or(DeviceError::InvalidDevice {
                device,
                count: devices.len() as u32,
            })
    }
}

impl DeviceQuery for StaticDevices {
    fn device_count(&self) -> Result<u32, DeviceError> {
        self.check()?;
        Ok(lock(&self.devices).len() as u32)
    }

    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo, DeviceError> {
        self.with_device(device, |snap| snap.memory)
    }

    fn running_processes(&self, device: DeviceId) -> Result<Vec<ProcessInfo>, DeviceError> {
        self.with_device(device, |snap| snap.processes.clone())
    }
}

/// Locks a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
