//! Reservation sizing with backoff.
//!
//! `/occ` tries to grab most of a device's free memory. When the driver
//! refuses, the request shrinks by [`BACKOFF_FACTOR`] and is retried, up
//! to [`MAX_ALLOCATION_ATTEMPTS`] attempts in total.

/// Share of the free memory requested on the first attempt.
pub const DEFAULT_OCCUPY_FRACTION: f64 = 0.95;

/// Each retry requests this share of the previous target.
pub const BACKOFF_FACTOR: f64 = 0.8;

/// Total number of allocation attempts per `/occ`.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 3;

/// Sequence of target sizes, in bytes, for one occupy request.
///
/// Iterating yields the first target followed by each shrunken retry.
#[derive(Debug, Clone)]
pub struct AllocationPlan {
    next: u64,
    remaining: usize,
}

impl AllocationPlan {
    /// Plans allocations starting at `fraction` of `free` bytes.
    pub fn new(free: u64, fraction: f64) -> Self {
        Self::starting_at(scale(free, fraction.clamp(0.0, 1.0)))
    }

    /// Plans allocations starting at an explicit first target.
    pub fn starting_at(first_target: u64) -> Self {
        Self {
            next: first_target,
            remaining: MAX_ALLOCATION_ATTEMPTS,
        }
    }
}

impl Iterator for AllocationPlan {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let current = self.next;
        self.next = scale(current, BACKOFF_FACTOR);
        Some(current)
    }
}

fn scale(bytes: u64, factor: f64) -> u64 {
    (bytes as f64 * factor) as u64
}
