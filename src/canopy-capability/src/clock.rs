//! Time source for expiry defaults and staleness checks.

use time::OffsetDateTime;

/// Supplies the current Unix time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // Pre-epoch clocks clamp to zero.
        OffsetDateTime::now_utc().unix_timestamp().max(0) as u64
    }
}

/// A clock pinned to one instant, for deterministic tests and replays.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}
