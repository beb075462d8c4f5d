//! Sort sequence: move to the bin, let the item drop, return home.
//!
//! At most one sequence runs at a time. Admission is a compare-and-swap on
//! the shared state, so a detection that arrives while a sequence is in
//! flight is dropped immediately instead of queueing behind it.
use crossbeam_channel as xch;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use sorter_traits::Stepper;
use sorter_traits::clock::Clock;
use tracing::{debug, error, info, warn};

use crate::actuator::{Actuator, MoveReport};
use crate::config::{ActuatorCfg, BinMap, SortCfg};
use crate::error::SorterError;
use crate::publisher::StatePublisher;
use crate::status::{Component, Health};
use crate::types::DetectionEvent;
use crate::util::SHUTDOWN_POLL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SortState {
    Idle = 0,
    Moving = 1,
    Settling = 2,
    ReturningHome = 3,
}

impl SortState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SortState::Moving,
            2 => SortState::Settling,
            3 => SortState::ReturningHome,
            _ => SortState::Idle,
        }
    }
}

/// Sequence state readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn load(&self) -> SortState {
        SortState::from_u8(self.0.load(Ordering::Acquire))
    }

    fn store(&self, s: SortState) {
        self.0.store(s as u8, Ordering::Release);
    }

    /// Idle -> Moving, or the state that blocked the claim.
    fn try_claim(&self) -> Result<(), SortState> {
        self.0
            .compare_exchange(
                SortState::Idle as u8,
                SortState::Moving as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(SortState::from_u8)
    }
}

/// Why a detection did not start a sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    LowConfidence { confidence: f32, threshold: f32 },
    UnknownLabel(String),
    Busy(SortState),
    /// The sort worker has stopped.
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Sorted {
        label: String,
        bin_position: i64,
        /// Shutdown cut the drop or dwell wait short.
        interrupted: bool,
    },
    Rejected(Rejection),
    Faulted(SorterError),
}

/// Admission rules shared by the orchestrator and its handles.
#[derive(Debug, Clone)]
pub struct SortPlan {
    pub bins: BinMap,
    pub cfg: SortCfg,
}

impl SortPlan {
    /// Target position for an acceptable event.
    pub fn screen(&self, event: &DetectionEvent) -> Result<i64, Rejection> {
        if event.confidence < self.cfg.min_confidence {
            return Err(Rejection::LowConfidence {
                confidence: event.confidence,
                threshold: self.cfg.min_confidence,
            });
        }
        self.bins
            .position(&event.label)
            .ok_or_else(|| Rejection::UnknownLabel(event.label.clone()))
    }
}

pub struct Orchestrator<S: Stepper, C: Clock> {
    actuator: Actuator<S, C>,
    clock: C,
    plan: Arc<SortPlan>,
    state: SharedState,
    publisher: StatePublisher,
    stop: Arc<AtomicBool>,
}

impl<S: Stepper, C: Clock + Clone> Orchestrator<S, C> {
    /// Claim the actuator. Fails with `HardwareInit` if the driver cannot be
    /// put into a known state.
    pub fn new(
        stepper: S,
        clock: C,
        actuator: &ActuatorCfg,
        plan: SortPlan,
        publisher: StatePublisher,
    ) -> Result<Self, SorterError> {
        let actuator = Actuator::initialize(stepper, clock.clone(), actuator)?;
        Ok(Self {
            actuator,
            clock,
            plan: Arc::new(plan),
            state: SharedState::default(),
            publisher,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

impl<S: Stepper, C: Clock> Orchestrator<S, C> {
    pub fn state(&self) -> SortState {
        self.state.load()
    }

    pub fn position(&self) -> i64 {
        self.actuator.position()
    }

    /// Run one full sequence for `event`, or reject it.
    pub fn handle_detection(&mut self, event: DetectionEvent) -> Outcome {
        let target = match self.plan.screen(&event) {
            Ok(t) => t,
            Err(r) => {
                debug!(label = %event.label, confidence = event.confidence, reason = ?r, "detection rejected");
                return Outcome::Rejected(r);
            }
        };
        if let Err(busy) = self.state.try_claim() {
            debug!(label = %event.label, state = ?busy, "detection dropped; sorter busy");
            return Outcome::Rejected(Rejection::Busy(busy));
        }
        self.run_claimed(event, target)
    }

    /// Move straight to `target` outside of any sort sequence.
    pub fn jog(&mut self, target: i64) -> Result<MoveReport, SorterError> {
        self.state
            .try_claim()
            .map_err(|s| SorterError::State(format!("sorter busy ({s:?})")))?;
        self.enter(SortState::Moving);
        let res = self.actuator.move_to(target);
        if let Err(e) = &res {
            self.publisher
                .set_health(Component::Actuator, Health::Error(e.to_string()));
        }
        self.enter(SortState::Idle);
        res
    }

    /// Release the actuator. Later detections are refused.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.actuator.shutdown();
    }

    fn run_claimed(&mut self, event: DetectionEvent, target: i64) -> Outcome {
        let home = self.plan.bins.home();
        self.publisher.record_detection(&event);
        self.enter(SortState::Moving);
        info!(label = %event.label, confidence = event.confidence, target, "sorting item");

        if target == home {
            debug!(label = %event.label, "bin is at home; no move needed");
        } else if let Err(e) = self.actuator.move_to(target) {
            return self.fault(e);
        }
        self.publisher.record_sort(&event.label);

        self.enter(SortState::Settling);
        let mut completed = self.wait(self.plan.cfg.drop_delay);

        self.enter(SortState::ReturningHome);
        if let Err(e) = self.actuator.move_to(home) {
            return self.fault(e);
        }
        completed &= self.wait(self.plan.cfg.home_dwell);

        self.publisher.set_health(Component::Actuator, Health::Ok);
        self.enter(SortState::Idle);
        Outcome::Sorted {
            label: event.label,
            bin_position: target,
            interrupted: !completed,
        }
    }

    fn fault(&mut self, e: SorterError) -> Outcome {
        error!(error = %e, position = self.actuator.position(), "sort sequence aborted");
        self.publisher
            .set_health(Component::Actuator, Health::Error(e.to_string()));
        self.enter(SortState::Idle);
        Outcome::Faulted(e)
    }

    fn enter(&self, s: SortState) {
        self.state.store(s);
        self.publisher.set_sort_state(s);
    }

    /// Sleep for `d` unless shutdown is requested first.
    fn wait(&self, d: Duration) -> bool {
        let stop = self.stop.clone();
        self.clock
            .sleep_while(d, SHUTDOWN_POLL, &move || !stop.load(Ordering::Acquire))
    }
}

/// What happened to a detection handed to `SortHandle::submit`.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted,
    Rejected(Rejection),
}

/// Non-blocking entry point into a running `SortWorker`.
#[derive(Clone)]
pub struct SortHandle {
    tx: xch::Sender<(DetectionEvent, i64)>,
    state: SharedState,
    plan: Arc<SortPlan>,
}

impl SortHandle {
    pub fn submit(&self, event: DetectionEvent) -> Submission {
        let target = match self.plan.screen(&event) {
            Ok(t) => t,
            Err(r) => return Submission::Rejected(r),
        };
        if let Err(busy) = self.state.try_claim() {
            debug!(label = %event.label, state = ?busy, "detection dropped; sorter busy");
            return Submission::Rejected(Rejection::Busy(busy));
        }
        match self.tx.try_send((event, target)) {
            Ok(()) => Submission::Accepted,
            Err(_) => {
                self.state.store(SortState::Idle);
                Submission::Rejected(Rejection::Closed)
            }
        }
    }

    pub fn state(&self) -> SortState {
        self.state.load()
    }
}

/// Owns the orchestrator on a dedicated thread so step timing is not
/// disturbed by capture or inference.
pub struct SortWorker {
    handle: SortHandle,
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl SortWorker {
    pub fn spawn<S, C>(orch: Orchestrator<S, C>) -> Self
    where
        S: Stepper + Send + 'static,
        C: Clock + Send + 'static,
    {
        Self::spawn_with(orch, || {})
    }

    /// Like `spawn`, running `on_start` on the worker thread first (for
    /// example to raise its scheduling priority).
    pub fn spawn_with<S, C, F>(mut orch: Orchestrator<S, C>, on_start: F) -> Self
    where
        S: Stepper + Send + 'static,
        C: Clock + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = xch::bounded::<(DetectionEvent, i64)>(1);
        let stop = orch.stop.clone();
        let handle = SortHandle {
            tx,
            state: orch.state.clone(),
            plan: orch.plan.clone(),
        };
        let thread_stop = stop.clone();
        let join = std::thread::Builder::new()
            .name("sort-worker".into())
            .spawn(move || {
                on_start();
                loop {
                    match rx.recv_timeout(SHUTDOWN_POLL) {
                        Ok((event, target)) => {
                            if thread_stop.load(Ordering::Acquire) {
                                orch.state.store(SortState::Idle);
                                break;
                            }
                            let outcome = orch.run_claimed(event, target);
                            debug!(?outcome, "sequence finished");
                        }
                        Err(xch::RecvTimeoutError::Timeout) => {
                            if thread_stop.load(Ordering::Acquire) {
                                break;
                            }
                        }
                        Err(xch::RecvTimeoutError::Disconnected) => break,
                    }
                }
                orch.shutdown();
                tracing::trace!("sort worker exiting cleanly");
            });
        let join = match join {
            Ok(j) => Some(j),
            Err(e) => {
                warn!(error = %e, "failed to spawn sort worker");
                None
            }
        };
        Self { handle, stop, join }
    }

    pub fn handle(&self) -> SortHandle {
        self.handle.clone()
    }

    /// Finish the sequence in flight (cutting its waits short), return home
    /// and release the actuator. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(h) = self.join.take() {
            if let Err(e) = h.join() {
                warn!(?e, "sort worker panicked during shutdown");
            }
        }
    }
}

impl Drop for SortWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sorter_hardware::SimulatedStepper;
    use sorter_traits::clock::test_clock::TestClock;
    use std::collections::BTreeMap;

    fn plan() -> SortPlan {
        let labels: Vec<String> = ["Metal", "Glass", "Carton"].map(String::from).into();
        let positions = BTreeMap::from([
            ("Metal".to_string(), 100_i64),
            ("Glass".to_string(), 200),
            ("Carton".to_string(), 0),
        ]);
        SortPlan {
            bins: BinMap::new(0, positions, &labels).unwrap(),
            cfg: SortCfg::default(),
        }
    }

    #[test]
    fn claim_is_exclusive() {
        let s = SharedState::default();
        assert_eq!(s.try_claim(), Ok(()));
        assert_eq!(s.try_claim(), Err(SortState::Moving));
        s.store(SortState::Idle);
        assert_eq!(s.try_claim(), Ok(()));
    }

    #[test]
    fn home_bin_skips_move_but_still_settles() {
        let stepper = SimulatedStepper::new();
        let probe = stepper.probe();
        let clock = TestClock::new();
        let publisher = StatePublisher::new(["Metal", "Glass", "Carton"]);
        let mut orch = Orchestrator::new(
            stepper,
            clock.clone(),
            &ActuatorCfg::default(),
            plan(),
            publisher.clone(),
        )
        .unwrap();
        let out = orch.handle_detection(DetectionEvent::new("Carton", 0.8));
        assert!(matches!(out, Outcome::Sorted { bin_position: 0, interrupted: false, .. }));
        assert_eq!(probe.pulses(), 0);
        assert!(clock.elapsed() >= Duration::from_millis(2500));
        assert_eq!(publisher.snapshot().counters.get("Carton"), 1);
    }

    #[test]
    fn unknown_label_is_rejected_without_motion() {
        let stepper = SimulatedStepper::new();
        let probe = stepper.probe();
        let mut orch = Orchestrator::new(
            stepper,
            TestClock::new(),
            &ActuatorCfg::default(),
            plan(),
            StatePublisher::new(["Metal"]),
        )
        .unwrap();
        let out = orch.handle_detection(DetectionEvent::new("Paper", 0.99));
        assert_eq!(out, Outcome::Rejected(Rejection::UnknownLabel("Paper".into())));
        assert_eq!(probe.pulses(), 0);
        assert_eq!(orch.state(), SortState::Idle);
    }

    #[test]
    fn jog_moves_and_returns_to_idle() {
        let stepper = SimulatedStepper::new();
        let probe = stepper.probe();
        let mut orch = Orchestrator::new(
            stepper,
            TestClock::new(),
            &ActuatorCfg::default(),
            plan(),
            StatePublisher::new(["Metal"]),
        )
        .unwrap();
        let rep = orch.jog(-15).unwrap();
        assert_eq!(rep.to, -15);
        assert_eq!(probe.position(), -15);
        assert_eq!(orch.state(), SortState::Idle);
    }
}
