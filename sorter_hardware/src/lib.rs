//! Device implementations behind the `sorter_traits` seams.
//!
//! Simulated devices are always available. GPIO devices need the `hardware`
//! feature, the V4L2 camera needs `camera`, and thread promotion needs `rt`;
//! all three are Linux-only.
pub mod error;
pub mod sim;
pub mod util;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub mod camera;

#[cfg(all(feature = "rt", target_os = "linux"))]
pub mod rt;

pub use error::HwError;
pub use sim::{ScriptedClassifier, SimulatedCamera, SimulatedEchoSensor, SimulatedStepper};

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::{GpioStepper, HcSr04};

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use camera::V4l2Camera;

/// Promote the calling thread to real-time priority when the `rt` feature is
/// built in; otherwise report that it is unavailable.
pub fn promote_current_thread(prio: i32) -> error::Result<i32> {
    #[cfg(all(feature = "rt", target_os = "linux"))]
    {
        rt::promote_current_thread(prio)
    }
    #[cfg(not(all(feature = "rt", target_os = "linux")))]
    {
        let _ = prio;
        Err(HwError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "real-time promotion not built in (enable the `rt` feature)",
        )))
    }
}
