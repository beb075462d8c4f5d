use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SorterError {
    /// An interface could not be claimed at startup. Fatal.
    #[error("hardware init failed: {0}")]
    HardwareInit(String),
    /// A move stopped mid-sequence; `reached` is the position actually reached.
    #[error("actuator fault at position {reached}: {message}")]
    ActuatorFault { reached: i64, message: String },
    #[error("sensor read failed: {0}")]
    SensorRead(String),
    #[error("capture failed: {0}")]
    Capture(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
