//! Occupancy state and change detection.
//!
//! An [`OccupancyState`] holds one label per device, ordered by device id.
//! The poller compares consecutive states and only notifies subscribers
//! when they differ.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DeviceSnapshot, MemoryInfo, GIB};

/// A device counts as occupied once used memory exceeds this many bytes.
///
/// The boundary is exclusive: exactly 1 GiB used is still available.
pub const OCCUPANCY_THRESHOLD_BYTES: u64 = GIB;

/// Occupancy label of a single device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "users", rename_all = "snake_case")]
pub enum OccupancyLabel {
    Available,
    /// Raw usernames of the processes on the device, sorted, no duplicates.
    ///
    /// Kept sorted so two labels with the same users compare equal no
    /// matter which order the driver listed the processes in.
    Occupied(Vec<String>),
}

impl OccupancyLabel {
    /// Classifies a device from its memory usage and process owners.
    ///
    /// Process owners are only consulted when the device is over the
    /// threshold; a listed process below the noise floor does not occupy it.
    pub fn classify<'a>(memory: &MemoryInfo, usernames: impl IntoIterator<Item = &'a str>) -> Self {
        if memory.used <= OCCUPANCY_THRESHOLD_BYTES {
            return Self::Available;
        }

        let mut users: Vec<String> = usernames.into_iter().map(str::to_string).collect();
        users.sort_unstable();
        users.dedup();
        if users.is_empty() {
            // Usually a process in another PID namespace
            debug!(used = memory.used, "Device over threshold with no visible processes");
        }
        Self::Occupied(users)
    }

    #[must_use]
    pub fn is_occupied(&self) -> bool {
        matches!(self, Self::Occupied(_))
    }
}

/// Occupancy of every device on the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OccupancyState(Vec<OccupancyLabel>);

impl OccupancyState {
    pub fn new(labels: Vec<OccupancyLabel>) -> Self {
        Self(labels)
    }

    /// Builds the state from one snapshot per device, in device order.
    pub fn from_snapshots(snapshots: &[DeviceSnapshot]) -> Self {
        Self(
            snapshots
                .iter()
                .map(|snap| {
                    OccupancyLabel::classify(
                        &snap.memory,
                        snap.processes.iter().map(|p| p.username.as_str()),
                    )
                })
                .collect(),
        )
    }

    pub fn labels(&self) -> &[OccupancyLabel] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true if `self` differs from the previously stored state.
    ///
    /// An absent previous state always counts as changed, so the first
    /// successful poll is always reported.
    #[must_use]
    pub fn differs_from(&self, previous: Option<&OccupancyState>) -> bool {
        match previous {
            Some(prev) => prev != self,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceId, ProcessInfo};

    fn snapshot(id: u32, used: u64, users: &[&str]) -> DeviceSnapshot {
        DeviceSnapshot {
            id: DeviceId::new(id),
            memory: MemoryInfo::new(used, 16 * GIB, 16 * GIB - used.min(16 * GIB)),
            processes: users
                .iter()
                .enumerate()
                .map(|(i, u)| ProcessInfo::new(1000 + i as u32, *u, vec!["python".to_string()]))
                .collect(),
        }
    }

    #[test]
    fn test_threshold_boundary_is_exclusive() {
        let at = MemoryInfo::new(GIB, 16 * GIB, 15 * GIB);
        assert_eq!(OccupancyLabel::classify(&at, ["alice"]), OccupancyLabel::Available);

        let over = MemoryInfo::new(GIB + 1, 16 * GIB, 15 * GIB - 1);
        assert_eq!(
            OccupancyLabel::classify(&over, ["alice"]),
            OccupancyLabel::Occupied(vec!["alice".to_string()])
        );
    }

    #[test]
    fn test_processes_below_threshold_do_not_occupy() {
        let state = OccupancyState::from_snapshots(&[snapshot(0, 512 * 1024 * 1024, &["bob"])]);
        assert_eq!(state.labels(), &[OccupancyLabel::Available]);
    }

    #[test]
    fn test_occupied_without_processes() {
        let state = OccupancyState::from_snapshots(&[snapshot(0, 2 * GIB, &[])]);
        assert_eq!(state.labels(), &[OccupancyLabel::Occupied(vec![])]);
    }

    #[test]
    fn test_duplicate_users_collapse() {
        let label = OccupancyLabel::classify(
            &MemoryInfo::new(4 * GIB, 16 * GIB, 12 * GIB),
            ["bob", "alice", "bob"],
        );
        assert_eq!(
            label,
            OccupancyLabel::Occupied(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn test_first_state_always_differs() {
        let state = OccupancyState::new(vec![OccupancyLabel::Available]);
        assert!(state.differs_from(None));
    }

    #[test]
    fn test_identical_states_do_not_differ() {
        let a = OccupancyState::from_snapshots(&[snapshot(0, 2 * GIB, &["alice"]), snapshot(1, 0, &[])]);
        let b = OccupancyState::from_snapshots(&[snapshot(0, 3 * GIB, &["alice"]), snapshot(1, 10, &[])]);
        assert!(!b.differs_from(Some(&a)));
    }

    #[test]
    fn test_single_index_change_differs() {
        let a = OccupancyState::new(vec![OccupancyLabel::Available, OccupancyLabel::Available]);
        let b = OccupancyState::new(vec![
            OccupancyLabel::Available,
            OccupancyLabel::Occupied(vec!["carol".to_string()]),
        ]);
        assert!(b.differs_from(Some(&a)));
    }

    #[test]
    fn test_length_change_differs() {
        let a = OccupancyState::new(vec![OccupancyLabel::Available]);
        let b = OccupancyState::new(vec![OccupancyLabel::Available, OccupancyLabel::Available]);
        assert!(b.differs_from(Some(&a)));
        assert!(a.differs_from(Some(&b)));
    }

    #[test]
    fn test_process_order_does_not_matter() {
        let a = OccupancyState::from_snapshots(&[snapshot(0, 4 * GIB, &["alice", "bob"])]);
        let b = OccupancyState::from_snapshots(&[snapshot(0, 4 * GIB, &["bob", "alice"])]);
        assert_eq!(a, b);
        assert!(!b.differs_from(Some(&a)));
    }

    #[test]
    fn test_different_users_differ() {
        let a = OccupancyState::from_snapshots(&[snapshot(0, 4 * GIB, &["alice", "bob"])]);
        let b = OccupancyState::from_snapshots(&[snapshot(0, 4 * GIB, &["alice", "carol"])]);
        assert!(b.differs_from(Some(&a)));
    }
}
