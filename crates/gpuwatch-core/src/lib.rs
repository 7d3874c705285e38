//! gpuwatch Core - Shared types for GPU occupancy monitoring
//!
//! This crate provides the domain types shared between the command
//! grammar (gpuwatch-protocol) and the daemon (gpuwatchd):
//! device snapshots, occupancy state and diffing, reservation sizing,
//! the poll interval, and the text formatting used in chat replies.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod device;
pub mod error;
pub mod format;
pub mod interval;
pub mod marker;
pub mod occupancy;
pub mod reservation;

// Re-exports for convenience
pub use device::{DeviceId, DeviceSnapshot, MemoryInfo, ProcessInfo, GIB};
pub use error::{AllocationError, DeviceError, DomainResult, ValidationError};
pub use format::{
    format_gb, status_line, status_report, usage_bar, usage_message, USAGE_BAR_WIDTH,
};
pub use interval::PollInterval;
pub use marker::{decorate_user, user_marker, DEFAULT_MARKER};
pub use occupancy::{OccupancyLabel, OccupancyState, OCCUPANCY_THRESHOLD_BYTES};
pub use reservation::{AllocationPlan, BACKOFF_FACTOR, DEFAULT_OCCUPY_FRACTION, MAX_ALLOCATION_ATTEMPTS};
