use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("gpio error: {0}")]
    Gpio(String),
    #[error("echo timeout")]
    EchoTimeout,
    #[error("echo pulse longer than {0:?}")]
    EchoTooLong(Duration),
    #[error("stepper fault after {0} pulses")]
    StepperFault(u64),
    #[error("camera unavailable: {0}")]
    Camera(String),
    #[error("camera returned no frame")]
    NoFrame,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
