//! Startup and shutdown of the whole sorter.
//!
//! Start order: publisher, actuator (fatal on failure, before any thread is
//! spawned), sort worker, fill monitor, capture loop. Shutdown runs in the
//! reverse order exactly once, from `shutdown` or from `Drop`.
use sorter_traits::clock::Clock;
use sorter_traits::{Classifier, FrameSource, Stepper};
use tracing::info;

use crate::capture::{CaptureCore, CaptureLoop, CaptureStats};
use crate::config::{ActuatorCfg, BinMap, CaptureCfg, SensorCfg, SortCfg};
use crate::error::SorterError;
use crate::orchestrator::{Orchestrator, SortHandle, SortPlan, SortWorker};
use crate::publisher::StatePublisher;
use crate::sensors::{BoxedEchoSensor, FillMonitor, SensorReader};
use crate::status::Lifecycle;

/// Everything `System::start` needs besides the devices.
#[derive(Debug, Clone)]
pub struct SystemCfg {
    pub labels: Vec<String>,
    pub bins: BinMap,
    pub actuator: ActuatorCfg,
    pub sort: SortCfg,
    pub capture: CaptureCfg,
    pub sensors: SensorCfg,
    pub rt_priority: Option<i32>,
}

/// The devices the sorter drives. Sensors are `(bin name, sensor)` pairs.
pub struct Devices<S, F, K> {
    pub stepper: S,
    pub camera: F,
    pub classifier: K,
    pub sensors: Vec<(String, BoxedEchoSensor)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub capture: CaptureStats,
}

pub struct System {
    publisher: StatePublisher,
    handle: SortHandle,
    worker: Option<SortWorker>,
    capture: Option<CaptureLoop>,
    monitor: Option<FillMonitor>,
    report: Option<ShutdownReport>,
}

impl System {
    /// Bring the sorter up. `on_worker_start` runs first thing on the sort
    /// worker thread.
    pub fn start<S, F, K, C, W>(
        cfg: SystemCfg,
        devices: Devices<S, F, K>,
        clock: C,
        on_worker_start: W,
    ) -> Result<Self, SorterError>
    where
        S: Stepper + Send + 'static,
        F: FrameSource + Send + 'static,
        K: Classifier + Send + 'static,
        C: Clock + Clone + Send + 'static,
        W: FnOnce() + Send + 'static,
    {
        let publisher = StatePublisher::new(cfg.labels.iter().cloned());
        let plan = SortPlan {
            bins: cfg.bins,
            cfg: cfg.sort,
        };
        let orch = Orchestrator::new(
            devices.stepper,
            clock.clone(),
            &cfg.actuator,
            plan,
            publisher.clone(),
        )?;
        let worker = SortWorker::spawn_with(orch, on_worker_start);
        let handle = worker.handle();

        let monitor = if devices.sensors.is_empty() {
            None
        } else {
            let reader = SensorReader::new(cfg.sensors, devices.sensors);
            Some(FillMonitor::spawn(reader, publisher.clone(), clock.clone()))
        };

        let core = CaptureCore::new(
            devices.camera,
            devices.classifier,
            handle.clone(),
            publisher.clone(),
            cfg.capture,
            clock,
        );
        let capture = CaptureLoop::spawn(core);

        publisher.set_lifecycle(Lifecycle::Running);
        info!(
            labels = cfg.labels.len(),
            sensors = monitor.is_some(),
            "sorter running"
        );
        Ok(Self {
            publisher,
            handle,
            worker: Some(worker),
            capture: Some(capture),
            monitor,
            report: None,
        })
    }

    pub fn publisher(&self) -> &StatePublisher {
        &self.publisher
    }

    /// Submit detections directly, bypassing the camera.
    pub fn sort_handle(&self) -> SortHandle {
        self.handle.clone()
    }

    /// Stop capture, then sampling, then the sort worker (which finishes its
    /// sequence, returns home and releases the actuator). Idempotent.
    pub fn shutdown(&mut self) -> ShutdownReport {
        if let Some(r) = self.report {
            return r;
        }
        info!("shutting down");
        let capture = self
            .capture
            .take()
            .map(|mut c| c.shutdown())
            .unwrap_or_default();
        if let Some(mut m) = self.monitor.take() {
            m.shutdown();
        }
        if let Some(mut w) = self.worker.take() {
            w.shutdown();
        }
        self.publisher.set_lifecycle(Lifecycle::Stopped);
        let report = ShutdownReport { capture };
        self.report = Some(report);
        info!(
            frames = capture.frames,
            submitted = capture.submitted,
            "sorter stopped"
        );
        report
    }
}

impl Drop for System {
    fn drop(&mut self) {
        self.shutdown();
    }
}
