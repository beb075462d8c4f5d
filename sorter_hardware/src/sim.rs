//! Simulated devices for development machines and tests.
//!
//! Each device exposes a cloneable probe so a test (or the CLI) can observe
//! what the core did to it after the device itself has been moved into a
//! worker thread.
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sorter_traits::{BoxError, Classification, Classifier, Direction, EchoSensor, Frame, FrameSource, Stepper};
use tracing::trace;

use crate::error::HwError;

/// Speed of sound used by the simulated echo sensor, in cm/s.
pub const SIM_SOUND_SPEED_CM_S: f32 = 34_300.0;

// ── Stepper ──────────────────────────────────────────────────────────────────

/// Observable state of a `SimulatedStepper`.
#[derive(Debug, Default)]
pub struct StepperProbe {
    position: AtomicI64,
    pulses: AtomicU64,
    forward: AtomicBool,
    enabled: AtomicBool,
    released: AtomicBool,
    release_calls: AtomicU32,
    enable_toggles: AtomicU32,
}

impl StepperProbe {
    /// Net signed pulse count (forward minus reverse).
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::SeqCst)
    }
    /// Total completed pulses in either direction.
    pub fn pulses(&self) -> u64 {
        self.pulses.load(Ordering::SeqCst)
    }
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }
    pub fn enable_toggles(&self) -> u32 {
        self.enable_toggles.load(Ordering::SeqCst)
    }
}

/// Step/dir stepper that counts pulses instead of moving a shaft.
pub struct SimulatedStepper {
    probe: Arc<StepperProbe>,
    has_enable: bool,
    step_high: bool,
    fail_after: Option<u64>,
    pulse_delay: Duration,
}

impl Default for SimulatedStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStepper {
    pub fn new() -> Self {
        Self {
            probe: Arc::new(StepperProbe::default()),
            has_enable: false,
            step_high: false,
            fail_after: None,
            pulse_delay: Duration::ZERO,
        }
    }

    /// Pretend the stage has an enable line.
    pub fn with_enable(mut self) -> Self {
        self.has_enable = true;
        self
    }

    /// Fail the rising edge of pulse `k + 1` (exactly `k` pulses complete).
    pub fn fail_after(mut self, k: u64) -> Self {
        self.fail_after = Some(k);
        self
    }

    /// Extra real delay per rising edge, to make moves observable in time.
    pub fn with_pulse_delay(mut self, d: Duration) -> Self {
        self.pulse_delay = d;
        self
    }

    pub fn probe(&self) -> Arc<StepperProbe> {
        self.probe.clone()
    }
}

impl Stepper for SimulatedStepper {
    fn set_direction(&mut self, dir: Direction) -> Result<(), BoxError> {
        self.probe
            .forward
            .store(dir == Direction::Forward, Ordering::SeqCst);
        Ok(())
    }

    fn set_step(&mut self, high: bool) -> Result<(), BoxError> {
        if self.probe.released() {
            return Err(Box::new(HwError::Gpio("step pin released".into())));
        }
        if high {
            if let Some(k) = self.fail_after
                && self.probe.pulses() >= k
            {
                return Err(Box::new(HwError::StepperFault(k)));
            }
            if !self.pulse_delay.is_zero() {
                std::thread::sleep(self.pulse_delay);
            }
        } else if self.step_high {
            // Falling edge completes a pulse.
            let unit = if self.probe.forward.load(Ordering::SeqCst) {
                1
            } else {
                -1
            };
            self.probe.position.fetch_add(unit, Ordering::SeqCst);
            self.probe.pulses.fetch_add(1, Ordering::SeqCst);
        }
        self.step_high = high;
        Ok(())
    }

    fn set_enabled(&mut self, on: bool) -> Result<(), BoxError> {
        if self.has_enable && self.probe.enabled.swap(on, Ordering::SeqCst) != on {
            self.probe.enable_toggles.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn has_enable(&self) -> bool {
        self.has_enable
    }

    fn release(&mut self) -> Result<(), BoxError> {
        self.probe.release_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.released.store(true, Ordering::SeqCst);
        self.probe.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ── Echo sensor ──────────────────────────────────────────────────────────────

/// Ultrasonic sensor replaying a distance script (`None` = no echo).
pub struct SimulatedEchoSensor {
    script: Vec<Option<f32>>,
    idx: usize,
    drift_cm: f32,
    offset_cm: f32,
}

impl SimulatedEchoSensor {
    /// Always report the same distance.
    pub fn constant(distance_cm: f32) -> Self {
        Self::scripted(vec![Some(distance_cm)])
    }

    /// Cycle through the given distances; `None` entries time out.
    pub fn scripted(script: Vec<Option<f32>>) -> Self {
        Self {
            script,
            idx: 0,
            drift_cm: 0.0,
            offset_cm: 0.0,
        }
    }

    /// Start at `start_cm` and get `step_cm` closer on every ping, as if the
    /// bin were slowly filling up.
    pub fn filling(start_cm: f32, step_cm: f32) -> Self {
        Self {
            script: vec![Some(start_cm)],
            idx: 0,
            drift_cm: step_cm,
            offset_cm: 0.0,
        }
    }
}

impl EchoSensor for SimulatedEchoSensor {
    fn ping(&mut self, _timeout: Duration) -> Result<Duration, BoxError> {
        let Some(entry) = self.script.get(self.idx % self.script.len().max(1)).copied() else {
            return Err(Box::new(HwError::EchoTimeout));
        };
        self.idx = self.idx.wrapping_add(1);
        let Some(base) = entry else {
            return Err(Box::new(HwError::EchoTimeout));
        };
        let d = (base - self.offset_cm).max(0.0);
        self.offset_cm += self.drift_cm;
        trace!(distance_cm = d, "simulated echo");
        Ok(Duration::from_secs_f32(2.0 * d / SIM_SOUND_SPEED_CM_S))
    }
}

// ── Camera ───────────────────────────────────────────────────────────────────

/// Observable state of a `SimulatedCamera`.
#[derive(Debug, Default)]
pub struct CameraProbe {
    grabs: AtomicUsize,
    failures: AtomicUsize,
    reopens: AtomicUsize,
    connected: AtomicBool,
}

impl CameraProbe {
    pub fn grabs(&self) -> usize {
        self.grabs.load(Ordering::SeqCst)
    }
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
    pub fn reopens(&self) -> usize {
        self.reopens.load(Ordering::SeqCst)
    }
    /// Plug the simulated camera in or out.
    pub fn set_connected(&self, on: bool) {
        self.connected.store(on, Ordering::SeqCst);
    }
}

/// Camera producing solid grey frames; can be unplugged through its probe.
pub struct SimulatedCamera {
    width: u32,
    height: u32,
    probe: Arc<CameraProbe>,
    frame_delay: Duration,
}

impl SimulatedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        let probe = Arc::new(CameraProbe::default());
        probe.set_connected(true);
        Self {
            width,
            height,
            probe,
            frame_delay: Duration::ZERO,
        }
    }

    /// Real delay per grab, mimicking a camera's frame interval.
    pub fn with_frame_delay(mut self, d: Duration) -> Self {
        self.frame_delay = d;
        self
    }

    pub fn probe(&self) -> Arc<CameraProbe> {
        self.probe.clone()
    }
}

impl FrameSource for SimulatedCamera {
    fn grab(&mut self) -> Result<Frame, BoxError> {
        if !self.frame_delay.is_zero() {
            std::thread::sleep(self.frame_delay);
        }
        if !self.probe.connected.load(Ordering::SeqCst) {
            self.probe.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Box::new(HwError::NoFrame));
        }
        self.probe.grabs.fetch_add(1, Ordering::SeqCst);
        Ok(Frame::solid(self.width, self.height, [128, 128, 128]))
    }

    fn reopen(&mut self) -> Result<(), BoxError> {
        self.probe.reopens.fetch_add(1, Ordering::SeqCst);
        if self.probe.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Box::new(HwError::Camera("simulated camera unplugged".into())))
        }
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// Classifier replaying a script of results, one per call, cycling.
#[derive(Clone)]
pub struct ScriptedClassifier {
    script: Arc<Mutex<(Vec<Option<Classification>>, usize)>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedClassifier {
    pub fn new(script: Vec<Option<Classification>>) -> Self {
        Self {
            script: Arc::new(Mutex::new((script, 0))),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit one detection every `every` calls, walking `labels` round-robin;
    /// the calls in between see an empty scene.
    pub fn round_robin(labels: &[String], every: usize, confidence: f32) -> Self {
        let every = every.max(1);
        let mut script = Vec::with_capacity(labels.len() * every);
        for label in labels {
            script.push(Some(Classification::new(label.clone(), confidence)));
            script.extend(std::iter::repeat_n(None, every - 1));
        }
        Self::new(script)
    }

    /// Number of `classify` calls so far (shared between clones).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for ScriptedClassifier {
    fn classify(&mut self, _frame: &Frame) -> Result<Option<Classification>, BoxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self
            .script
            .lock()
            .map_err(|_| HwError::Camera("classifier script poisoned".into()))?;
        let (script, idx) = &mut *guard;
        if script.is_empty() {
            return Ok(None);
        }
        let out = script[*idx % script.len()].clone();
        *idx = idx.wrapping_add(1);
        Ok(out)
    }
}
