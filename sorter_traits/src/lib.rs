//! Hardware seams for the sorting appliance.
//!
//! Every device the core drives is reached through one of these traits so the
//! orchestration logic runs unchanged against GPIO, V4L2 or simulated parts.
pub mod clock;
pub mod frame;

pub use clock::{Clock, MonotonicClock};
pub use frame::{Classification, Frame};

/// Error type used at every trait boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Rotation sense of a step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Increasing step count.
    Forward,
    /// Decreasing step count.
    Reverse,
}

impl Direction {
    /// Direction of travel for a signed step delta (`None` for zero).
    pub fn of_delta(delta: i64) -> Option<Self> {
        match delta.signum() {
            1 => Some(Self::Forward),
            -1 => Some(Self::Reverse),
            _ => None,
        }
    }

    /// Signed unit step in this direction.
    pub fn unit(self) -> i64 {
        match self {
            Self::Forward => 1,
            Self::Reverse => -1,
        }
    }
}

/// Two-wire (step + direction) stepper driver stage, optionally with an enable line.
pub trait Stepper {
    fn set_direction(&mut self, dir: Direction) -> Result<(), BoxError>;
    /// Drive the STEP line; one pulse is a high level followed by a low level.
    fn set_step(&mut self, high: bool) -> Result<(), BoxError>;
    /// Energize or de-energize the driver stage. Stages without an enable
    /// line accept and ignore the call.
    fn set_enabled(&mut self, _on: bool) -> Result<(), BoxError> {
        Ok(())
    }
    /// Whether the stage has an enable line at all.
    fn has_enable(&self) -> bool {
        false
    }
    /// Release the underlying pins. Called once during shutdown.
    fn release(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Ultrasonic time-of-flight sensor (trigger + echo).
pub trait EchoSensor {
    /// Fire one ping and return the width of the echo pulse.
    fn ping(&mut self, timeout: std::time::Duration) -> Result<std::time::Duration, BoxError>;
}

/// Camera or any other source of frames.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, BoxError>;
    /// Close and re-acquire the device after repeated grab failures.
    fn reopen(&mut self) -> Result<(), BoxError>;
}

/// Opaque single-frame classifier. Returns the best detection or `None`.
pub trait Classifier {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, BoxError>;
}

impl<T: Stepper + ?Sized> Stepper for Box<T> {
    fn set_direction(&mut self, dir: Direction) -> Result<(), BoxError> {
        (**self).set_direction(dir)
    }
    fn set_step(&mut self, high: bool) -> Result<(), BoxError> {
        (**self).set_step(high)
    }
    fn set_enabled(&mut self, on: bool) -> Result<(), BoxError> {
        (**self).set_enabled(on)
    }
    fn has_enable(&self) -> bool {
        (**self).has_enable()
    }
    fn release(&mut self) -> Result<(), BoxError> {
        (**self).release()
    }
}

impl<T: EchoSensor + ?Sized> EchoSensor for Box<T> {
    fn ping(&mut self, timeout: std::time::Duration) -> Result<std::time::Duration, BoxError> {
        (**self).ping(timeout)
    }
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn grab(&mut self) -> Result<Frame, BoxError> {
        (**self).grab()
    }
    fn reopen(&mut self) -> Result<(), BoxError> {
        (**self).reopen()
    }
}

impl<T: Classifier + ?Sized> Classifier for Box<T> {
    fn classify(&mut self, frame: &Frame) -> Result<Option<Classification>, BoxError> {
        (**self).classify(frame)
    }
}
