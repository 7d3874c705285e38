//! Poll interval value object.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DomainResult, ValidationError};

/// Seconds between two poll cycles, bounded to `[MIN_SECS, MAX_SECS]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct PollInterval(u64);

impl PollInterval {
    pub const MIN_SECS: u64 = 1;
    pub const MAX_SECS: u64 = 60 * 60;
    pub const DEFAULT: PollInterval = PollInterval(5);

    /// Validates and wraps a number of seconds.
    pub fn from_secs(secs: u64) -> DomainResult<Self> {
        if !(Self::MIN_SECS..=Self::MAX_SECS).contains(&secs) {
            return Err(ValidationError::OutOfRange {
                field: "interval",
                value: i64::try_from(secs).unwrap_or(i64::MAX),
                min: Self::MIN_SECS as i64,
                max: Self::MAX_SECS as i64,
            });
        }
        Ok(Self(secs))
    }

    pub fn as_secs(self) -> u64 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for PollInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

impl TryFrom<u64> for PollInterval {
    type Error = ValidationError;

    fn try_from(secs: u64) -> Result<Self, Self::Error> {
        Self::from_secs(secs)
    }
}

impl From<PollInterval> for u64 {
    fn from(interval: PollInterval) -> Self {
        interval.0
    }
}
