//! Common time/period helpers for sorter_core.
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Number of microseconds in one second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Slice length used when a wait has to notice shutdown promptly.
pub const SHUTDOWN_POLL: Duration = Duration::from_millis(20);

/// Compute the period in microseconds for a given rate in Hz.
/// - Clamps `hz` to at least 1 to avoid division by zero.
/// - Ensures result is at least 1 microsecond.
#[inline]
pub fn period_us(hz: u32) -> u64 {
    (MICROS_PER_SEC / u64::from(hz.max(1))).max(1)
}

#[inline]
pub fn period(hz: u32) -> Duration {
    Duration::from_micros(period_us(hz))
}

/// Milliseconds since the Unix epoch (0 if the wall clock is before 1970).
pub fn unix_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

pub fn now_unix_ms() -> u64 {
    unix_ms(SystemTime::now())
}
