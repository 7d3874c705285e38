//! NVML-backed device adapter.
//!
//! Memory statistics and compute process ids come from NVML; process
//! owners and command lines are resolved through `sysinfo`.

use std::sync::Mutex;

use nvml_wrapper::error::NvmlError;
use nvml_wrapper::{Device, Nvml};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind, Users};
use tracing::{debug, info};

use gpuwatch_core::{DeviceError, DeviceId, MemoryInfo, ProcessInfo};

use super::{lock, DeviceQuery};

/// Username shown for a process that exited before it could be resolved.
const UNKNOWN_USER: &str = "unknown";

/// Device adapter over the NVIDIA management library.
pub struct NvmlDevices {
    nvml: Nvml,
    resolver: Mutex<ProcessResolver>,
}

impl NvmlDevices {
    /// Loads and initializes NVML.
    ///
    /// # Errors
    /// - `DeviceError::Unavailable` if the library or driver is missing
    pub fn init() -> Result<Self, DeviceError> {
        let nvml = Nvml::init().map_err(|e| match e {
            NvmlError::DriverNotLoaded | NvmlError::LibraryNotFound => {
                DeviceError::Unavailable("NVIDIA driver is not loaded".to_string())
            }
            NvmlError::NoPermission => DeviceError::Unavailable(
                "no permission to access NVML; add the user to the video group".to_string(),
            ),
            other => DeviceError::Unavailable(format!("NVML init error: {other}")),
        })?;

        let count = nvml.device_count().unwrap_or(0);
        info!(device_count = count, "NVML initialized");

        Ok(Self {
            nvml,
            resolver: Mutex::new(ProcessResolver::new()),
        })
    }

    fn device(&self, device: DeviceId) -> Result<Device<'_>, DeviceError> {
        self.nvml
            .device_by_index(device.index())
            .map_err(|e| match e {
                NvmlError::InvalidArg => DeviceError::InvalidDevice {
                    device,
                    count: self.nvml.device_count().unwrap_or(0),
                },
                other => DeviceError::QueryFailed {
                    device,
                    query: "device_by_index",
                    reason: other.to_string(),
                },
            })
    }
}

impl DeviceQuery for NvmlDevices {
    fn device_count(&self) -> Result<u32, DeviceError> {
        self.nvml
            .device_count()
            .map_err(|e| DeviceError::CountFailed(e.to_string()))
    }

    fn memory_info(&self, device: DeviceId) -> Result<MemoryInfo, DeviceError> {
        let info = self
            .device(device)?
            .memory_info()
            .map_err(|e| DeviceError::QueryFailed {
                device,
                query: "memory_info",
                reason: e.to_string(),
            })?;
        Ok(MemoryInfo::new(info.used, info.total, info.free))
    }

    fn running_processes(&self, device: DeviceId) -> Result<Vec<ProcessInfo>, DeviceError> {
        let procs = self
            .device(device)?
            .running_compute_processes()
            .map_err(|e| DeviceError::QueryFailed {
                device,
                query: "running_compute_processes",
                reason: e.to_string(),
            })?;

        let pids: Vec<u32> = procs.iter().map(|p| p.pid).collect();
        debug!(device = %device, pids = ?pids, "Resolving device processes");
        Ok(lock(&self.resolver).resolve(&pids))
    }
}

// ============================================================================
// Process Resolution
// ============================================================================

/// Maps process ids to owner names and command lines.
struct ProcessResolver {
    system: System,
    users: Users,
}

impl ProcessResolver {
    fn new() -> Self {
        Self {
            system: System::new(),
            users: Users::new_with_refreshed_list(),
        }
    }

    fn resolve(&mut self, pids: &[u32]) -> Vec<ProcessInfo> {
        if pids.is_empty() {
            return Vec::new();
        }

        let sys_pids: Vec<Pid> = pids.iter().map(|pid| Pid::from_u32(*pid)).collect();
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&sys_pids),
            true,
            ProcessRefreshKind::new()
                .with_user(UpdateKind::Always)
                .with_cmd(UpdateKind::Always),
        );

        // Users created after startup are missing from the cached list
        let unknown_uid = sys_pids
            .iter()
            .filter_map(|pid| self.system.process(*pid))
            .filter_map(|proc| proc.user_id())
            .any(|uid| self.users.get_user_by_id(uid).is_none());
        if unknown_uid {
            self.users.refresh_list();
        }

        sys_pids
            .iter()
            .map(|pid| match self.system.process(*pid) {
                Some(proc) => {
                    let username = proc
                        .user_id()
                        .and_then(|uid| self.users.get_user_by_id(uid))
                        .map(|user| user.name().to_string())
                        .unwrap_or_else(|| UNKNOWN_USER.to_string());
                    let cmdline = proc
                        .cmd()
                        .iter()
                        .map(|arg| arg.to_string_lossy().into_owned())
                        .collect();
                    ProcessInfo::new(pid.as_u32(), username, cmdline)
                }
                None => ProcessInfo::new(pid.as_u32(), UNKNOWN_USER, Vec::new()),
            })
            .collect()
    }
}
