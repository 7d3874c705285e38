//! Domain-specific error types following panic-free policy.

use crate::DeviceId;
use thiserror::Error;

/// Errors raised by the device query layer.
///
/// Always recoverable: a failed poll cycle is reported and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device management library could not be loaded or initialized
    #[error("Device library unavailable: {0}")]
    Unavailable(String),

    /// Device index outside `[0, device_count)`
    #[error("Invalid GPU ID {device}: must be between 0 and {max}", max = .count.saturating_sub(1))]
    InvalidDevice { device: DeviceId, count: u32 },

    /// A driver query failed
    #[error("Query {query} failed on GPU {device}: {reason}")]
    QueryFailed {
        device: DeviceId,
        query: &'static str,
        reason: String,
    },

    /// The device count could not be read
    #[error("Failed to read device count: {0}")]
    CountFailed(String),

    /// A query did not complete in time
    #[error("Device query timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Errors raised while reserving device memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    /// The device has no room for the requested block
    #[error("Out of memory allocating {bytes} bytes on GPU {device}: {reason}")]
    OutOfMemory {
        device: DeviceId,
        bytes: u64,
        reason: String,
    },

    /// The device context could not be created
    #[error("Failed to open GPU {device}: {reason}")]
    DeviceOpen { device: DeviceId, reason: String },

    /// This build has no reservation backend
    #[error("Memory reservation is not supported by this build")]
    Unsupported,
}

/// Invalid input supplied by a user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Value outside its permitted range
    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, ValidationError>;
