//! SCHED_FIFO promotion for the thread that emits step pulses.
use crate::error::{HwError, Result};

/// Give the calling thread SCHED_FIFO priority `prio`, clamped to the range
/// the kernel reports. Returns the priority actually applied.
///
/// Needs CAP_SYS_NICE (or root); callers are expected to log and carry on
/// when this fails.
pub fn promote_current_thread(prio: i32) -> Result<i32> {
    let (min, max) = unsafe {
        let min = libc::sched_get_priority_min(libc::SCHED_FIFO);
        let max = libc::sched_get_priority_max(libc::SCHED_FIFO);
        if min < 0 || max < 0 { (1, 99) } else { (min, max) }
    };
    let applied = prio.clamp(min, max);
    let param = libc::sched_param {
        sched_priority: applied,
    };
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(HwError::Io(std::io::Error::from_raw_os_error(rc)));
    }
    Ok(applied)
}
