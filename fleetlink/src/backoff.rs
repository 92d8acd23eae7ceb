//! Reconnect delay policy.
//!
//! Delays grow linearly with the number of failed attempts and are capped,
//! so a node that reboots is picked up again within a few seconds while a
//! node that is gone for good costs one attempt every `cap`.

use std::time::Duration;

pub const DEFAULT_BASE_MS: u64 = 2_000;
pub const DEFAULT_CAP_MS: u64 = 10_000;
pub const DEFAULT_FLOOR_MS: u64 = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
    /// Delay used when no attempt has failed yet. Never zero.
    pub floor: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration, floor: Duration) -> Self {
        Self {
            base,
            cap,
            floor: floor.max(Duration::from_millis(1)),
        }
    }

    pub fn from_millis(base_ms: u64, cap_ms: u64, floor_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(base_ms),
            Duration::from_millis(cap_ms),
            Duration::from_millis(floor_ms),
        )
    }

    /// Delay before the next connection attempt given the failed-attempt count.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return self.floor;
        }
        self.base.saturating_mul(attempt).min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_millis(DEFAULT_BASE_MS, DEFAULT_CAP_MS, DEFAULT_FLOOR_MS)
    }
}
