use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until `read` reports `level`, or `timeout` expires.
///
/// Returns the instant the level was first observed. A zero `poll_interval`
/// busy-waits, which the echo measurement needs for microsecond resolution.
pub fn wait_for_level_with_timeout(
    mut read: impl FnMut() -> bool,
    level: bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Instant> {
    let deadline = Instant::now() + timeout;
    loop {
        if read() == level {
            return Ok(Instant::now());
        }
        if Instant::now() >= deadline {
            return Err(HwError::EchoTimeout);
        }
        if poll_interval.is_zero() {
            std::hint::spin_loop();
        } else {
            std::thread::sleep(poll_interval);
        }
    }
}

/// Measure how long `read` stays high once it has gone high.
///
/// Fails with `EchoTimeout` when the line never rises and `EchoTooLong` when
/// it does not fall again within `timeout`.
pub fn measure_high_pulse(
    mut read: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<Duration> {
    let rose = wait_for_level_with_timeout(&mut read, true, timeout, poll_interval)?;
    match wait_for_level_with_timeout(&mut read, false, timeout, poll_interval) {
        Ok(fell) => Ok(fell.saturating_duration_since(rose)),
        Err(HwError::EchoTimeout) => Err(HwError::EchoTooLong(timeout)),
        Err(e) => Err(e),
    }
}
