#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core sorting logic (hardware-agnostic).
//!
//! All hardware interactions go through the `sorter_traits` seams
//! (`Stepper`, `EchoSensor`, `FrameSource`, `Classifier`) and time goes
//! through `Clock`, so every module here runs against simulated devices and
//! a `TestClock` in tests.
//!
//! ## Architecture
//!
//! - **Actuator**: counted-pulse absolute positioning (`actuator`)
//! - **Orchestrator**: the one-at-a-time sort sequence and its worker thread
//! - **Capture**: grab, classify and submit, with camera recovery (`capture`)
//! - **Fill levels**: echo math and smoothing (`fill`), sampling thread (`sensors`)
//! - **Publisher**: consistent snapshots for observers (`publisher`)
//! - **System**: start and shutdown ordering (`system`)

pub mod actuator;
pub mod capture;
pub mod config;
pub mod conversions;
pub mod error;
pub mod fill;
pub mod hw_error;
pub mod orchestrator;
pub mod publisher;
pub mod sensors;
pub mod status;
pub mod system;
pub mod types;
pub mod util;

pub use actuator::{Actuator, MoveReport};
pub use capture::{CaptureCore, CaptureLoop, CaptureStats, DetectionSink, Tick};
pub use config::{ActuatorCfg, BinMap, CaptureCfg, Ramp, SensorCfg, SortCfg};
pub use error::{Report, Result, SorterError};
pub use orchestrator::{
    Orchestrator, Outcome, Rejection, SortHandle, SortPlan, SortState, SortWorker, Submission,
};
pub use publisher::{Snapshot, StatePublisher, Subscription};
pub use sensors::{BoxedEchoSensor, FillMonitor, SensorReader};
pub use status::{Component, Health, Lifecycle, SystemStatus};
pub use system::{Devices, ShutdownReport, System, SystemCfg};
pub use types::{Counters, DetectionEvent, FillLevelReading};
