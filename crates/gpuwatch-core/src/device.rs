//! Device snapshot entities.
//!
//! Every value here is a read-only snapshot taken from the device driver.
//! Snapshots are never mutated, only re-fetched on the next poll.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One gibibyte in bytes.
pub const GIB: u64 = 1024 * 1024 * 1024;

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Index of an accelerator device, valid in `[0, device_count)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u32);

impl DeviceId {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw device index.
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns true if this id addresses one of `device_count` devices.
    #[must_use]
    pub fn is_valid_for(self, device_count: u32) -> bool {
        self.0 < device_count
    }

    /// Iterates every device id for a host with `device_count` devices.
    pub fn all(device_count: u32) -> impl Iterator<Item = DeviceId> {
        (0..device_count).map(DeviceId)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DeviceId {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

// ============================================================================
// Memory and Process Snapshots
// ============================================================================

/// Memory statistics of a single device, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    pub used: u64,
    pub total: u64,
    pub free: u64,
}

impl MemoryInfo {
    pub fn new(used: u64, total: u64, free: u64) -> Self {
        Self { used, total, free }
    }

    /// Fraction of total memory in use, in `[0.0, 1.0]`.
    ///
    /// A device reporting zero total memory counts as empty.
    pub fn used_fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.used as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// A process holding a device context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub username: String,
    /// Command line tokens in argv order.
    pub cmdline: Vec<String>,
}

impl ProcessInfo {
    pub fn new(pid: u32, username: impl Into<String>, cmdline: Vec<String>) -> Self {
        Self {
            pid,
            username: username.into(),
            cmdline,
        }
    }

    /// Command line joined with single spaces for display.
    pub fn command_line(&self) -> String {
        self.cmdline.join(" ")
    }
}

/// Everything one poll learned about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub id: DeviceId,
    pub memory: MemoryInfo,
    pub processes: Vec<ProcessInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_range() {
        assert!(DeviceId::new(0).is_valid_for(1));
        assert!(!DeviceId::new(1).is_valid_for(1));
        assert!(!DeviceId::new(0).is_valid_for(0));
    }

    #[test]
    fn test_device_id_all() {
        let ids: Vec<u32> = DeviceId::all(3).map(DeviceId::index).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(DeviceId::all(0).count(), 0);
    }

    #[test]
    fn test_device_id_serde_transparent() {
        let json = serde_json::to_string(&DeviceId::new(4)).unwrap();
        assert_eq!(json, "4");
    }

    #[test]
    fn test_used_fraction() {
        assert_eq!(MemoryInfo::new(0, 0, 0).used_fraction(), 0.0);
        assert_eq!(MemoryInfo::new(4 * GIB, 16 * GIB, 12 * GIB).used_fraction(), 0.25);
        // Driver rounding can report used > total
        assert_eq!(MemoryInfo::new(17, 16, 0).used_fraction(), 1.0);
    }

    #[test]
    fn test_command_line_join() {
        let proc = ProcessInfo::new(
            42,
            "alice",
            vec!["python".to_string(), "train.py".to_string(), "--lr=3e-4".to_string()],
        );
        assert_eq!(proc.command_line(), "python train.py --lr=3e-4");
    }
}
