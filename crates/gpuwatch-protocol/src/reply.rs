//! Reply texts sent back to users.

use gpuwatch_core::{format_gb, DeviceId, PollInterval};

use crate::ChatId;

/// Sent to non-whitelisted senders of `/start` and privileged commands.
pub fn not_whitelisted(sender: ChatId) -> String {
    format!(
        "You are not yet on the whitelist. \
         Add {sender} to your config to receive notifications from me"
    )
}

/// Sent to whitelisted senders of `/start`.
pub fn welcome() -> String {
    "Hi! I will notify you when someone starts to use the GPU and when it's available again"
        .to_string()
}

/// Sent when a device id is outside `[0, device_count)`.
pub fn invalid_device(device_count: u32) -> String {
    if device_count == 0 {
        return "Invalid GPU ID. No GPUs are available".to_string();
    }
    format!(
        "Invalid GPU ID. Must be between 0 and {}",
        device_count - 1
    )
}

pub fn allocated(device: DeviceId, bytes: u64) -> String {
    format!("Allocated {}GB on GPU {device}", format_gb(bytes))
}

/// Progress note for a failed attempt that will be retried.
pub fn allocation_retry(device: DeviceId, bytes: u64) -> String {
    format!(
        "Could not allocate {}GB on GPU {device}. Trying again with 80% of the memory",
        format_gb(bytes)
    )
}

/// Final note once every attempt failed.
pub fn allocation_failed(device: DeviceId, attempts: usize, reason: &str) -> String {
    format!("Failed to occupy GPU {device} after {attempts} attempts: {reason}")
}

pub fn released(device: DeviceId) -> String {
    format!("Released GPU {device}")
}

pub fn not_occupied(device: DeviceId) -> String {
    format!("GPU {device} is not occupied")
}

pub fn interval_set(interval: PollInterval) -> String {
    format!("Interval set to {interval}")
}

/// Sent for `/gpu` on a host without devices.
pub fn no_devices() -> String {
    "No GPUs found".to_string()
}

/// Sent when the reservation service has shut down.
pub fn reservations_unavailable() -> String {
    "Reservations are unavailable right now, try again later".to_string()
}

/// Sent when the device layer fails while answering a command.
pub fn device_failure(err: &impl std::fmt::Display) -> String {
    format!("Failed to query GPUs: {err}")
}
