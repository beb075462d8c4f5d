//! Sort sequence behaviour, synchronous and through the worker thread.
use rstest::rstest;
use sorter_core::{
    ActuatorCfg, BinMap, DetectionEvent, Orchestrator, Outcome, Rejection, SortCfg, SortPlan,
    SortState, SortWorker, StatePublisher, SorterError, Submission, SystemStatus,
};
use sorter_hardware::SimulatedStepper;
use sorter_traits::clock::MonotonicClock;
use sorter_traits::clock::test_clock::TestClock;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

const LABELS: [&str; 4] = ["Metal", "Glass", "Plastic", "Carton"];

fn plan(sort: SortCfg) -> SortPlan {
    let labels: Vec<String> = LABELS.iter().map(|s| s.to_string()).collect();
    let positions: BTreeMap<String, i64> = LABELS
        .iter()
        .zip([100_i64, 200, 300, 400])
        .map(|(l, p)| (l.to_string(), p))
        .collect();
    SortPlan {
        bins: BinMap::new(0, positions, &labels).unwrap(),
        cfg: sort,
    }
}

fn actuator_cfg() -> ActuatorCfg {
    ActuatorCfg {
        step_delay: Duration::from_micros(100),
        settle: Duration::from_millis(10),
        ..ActuatorCfg::default()
    }
}

#[test]
fn glass_goes_to_its_bin_and_back() {
    let stepper = SimulatedStepper::new().with_enable();
    let probe = stepper.probe();
    let clock = TestClock::new();
    let publisher = StatePublisher::new(LABELS);
    let sub = publisher.subscribe();
    let mut orch = Orchestrator::new(
        stepper,
        clock.clone(),
        &actuator_cfg(),
        plan(SortCfg::default()),
        publisher.clone(),
    )
    .unwrap();

    let out = orch.handle_detection(DetectionEvent::new("Glass", 0.91));
    assert_eq!(
        out,
        Outcome::Sorted {
            label: "Glass".into(),
            bin_position: 200,
            interrupted: false
        }
    );
    assert_eq!(orch.position(), 0);
    assert_eq!(probe.position(), 0);
    assert_eq!(probe.pulses(), 400);
    assert_eq!(orch.state(), SortState::Idle);

    // The drop delay and home dwell were both honoured.
    let sleeps = clock.sleeps();
    assert!(sleeps.iter().copied().sum::<Duration>() >= Duration::from_millis(2500));

    let snap = publisher.snapshot();
    assert_eq!(snap.counters.get("Glass"), 1);
    assert_eq!(snap.counters.total, 1);
    assert_eq!(snap.last_detection.as_ref().map(|d| d.label.as_str()), Some("Glass"));

    // Observers saw the whole sequence in order.
    let states: Vec<SortState> = sub.try_iter().map(|s| s.sort_state).collect();
    let mut seen: Vec<SortState> = Vec::new();
    for s in states {
        if seen.last() != Some(&s) {
            seen.push(s);
        }
    }
    assert_eq!(
        seen,
        vec![
            SortState::Idle,
            SortState::Moving,
            SortState::Settling,
            SortState::ReturningHome,
            SortState::Idle
        ]
    );
}

#[rstest]
#[case(0.49)]
#[case(0.0)]
fn low_confidence_never_moves(#[case] confidence: f32) {
    let stepper = SimulatedStepper::new();
    let probe = stepper.probe();
    let publisher = StatePublisher::new(LABELS);
    let mut orch = Orchestrator::new(
        stepper,
        TestClock::new(),
        &actuator_cfg(),
        plan(SortCfg::default()),
        publisher.clone(),
    )
    .unwrap();
    let out = orch.handle_detection(DetectionEvent::new("Metal", confidence));
    assert!(matches!(out, Outcome::Rejected(Rejection::LowConfidence { .. })));
    assert_eq!(probe.pulses(), 0);
    assert_eq!(publisher.snapshot().counters.total, 0);
}

#[test]
fn fault_leaves_position_and_flags_actuator() {
    let stepper = SimulatedStepper::new().with_enable().fail_after(150);
    let probe = stepper.probe();
    let publisher = StatePublisher::new(LABELS);
    let mut orch = Orchestrator::new(
        stepper,
        TestClock::new(),
        &actuator_cfg(),
        plan(SortCfg::default()),
        publisher.clone(),
    )
    .unwrap();
    let out = orch.handle_detection(DetectionEvent::new("Plastic", 0.8));
    assert!(matches!(
        out,
        Outcome::Faulted(SorterError::ActuatorFault { reached: 150, .. })
    ));
    assert_eq!(orch.position(), 150);
    assert_eq!(probe.position(), 150);
    assert_eq!(orch.state(), SortState::Idle);
    let snap = publisher.snapshot();
    assert_eq!(snap.status, SystemStatus::Error);
    assert!(snap.message.starts_with("actuator:"), "{}", snap.message);
    assert_eq!(snap.counters.total, 0);
}

#[test]
fn fault_on_the_way_home_keeps_the_sort() {
    // 200 pulses out succeed, the return fails after 50 more.
    let stepper = SimulatedStepper::new().with_enable().fail_after(250);
    let probe = stepper.probe();
    let publisher = StatePublisher::new(LABELS);
    let mut orch = Orchestrator::new(
        stepper,
        TestClock::new(),
        &actuator_cfg(),
        plan(SortCfg::default()),
        publisher.clone(),
    )
    .unwrap();
    let out = orch.handle_detection(DetectionEvent::new("Glass", 0.9));
    assert!(
        matches!(out, Outcome::Faulted(SorterError::ActuatorFault { reached: 150, .. })),
        "{out:?}"
    );
    assert_eq!(orch.position(), 150);
    assert_eq!(probe.position(), 150);
    assert_eq!(orch.state(), SortState::Idle);
    let snap = publisher.snapshot();
    assert_eq!(snap.status, SystemStatus::Error);
    assert_eq!(snap.sort_state, SortState::Idle);
    assert_eq!(snap.counters.get("Glass"), 1);
    assert_eq!(snap.counters.total, 1);
}

// Real time: 200 ms per leg, 100 ms settling.
#[rstest]
#[case(SortState::Moving)]
#[case(SortState::Settling)]
#[case(SortState::ReturningHome)]
fn detection_while_busy_is_dropped_not_queued(#[case] during: SortState) {
    let stepper = SimulatedStepper::new();
    let probe = stepper.probe();
    let publisher = StatePublisher::new(LABELS);
    let sort = SortCfg {
        drop_delay: Duration::from_millis(100),
        home_dwell: Duration::from_millis(10),
        ..SortCfg::default()
    };
    let act = ActuatorCfg {
        step_delay: Duration::from_millis(1),
        settle: Duration::ZERO,
        ..ActuatorCfg::default()
    };
    let orch = Orchestrator::new(stepper, MonotonicClock::new(), &act, plan(sort), publisher.clone())
        .unwrap();
    let mut worker = SortWorker::spawn(orch);
    let handle = worker.handle();

    assert_eq!(handle.submit(DetectionEvent::new("Metal", 0.9)), Submission::Accepted);
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.state() != during {
        assert!(Instant::now() < deadline, "never reached {during:?}");
        std::thread::sleep(Duration::from_millis(1));
    }
    let busy = handle.submit(DetectionEvent::new("Glass", 0.9));
    assert_eq!(busy, Submission::Rejected(Rejection::Busy(during)));

    while publisher.snapshot().counters.total < 1 || handle.state() != SortState::Idle {
        assert!(Instant::now() < deadline, "sequence did not finish");
        std::thread::sleep(Duration::from_millis(5));
    }
    // Give a queued second sequence the chance to start, then check none did.
    std::thread::sleep(Duration::from_millis(50));
    worker.shutdown();

    let snap = publisher.snapshot();
    assert_eq!(snap.counters.get("Metal"), 1);
    assert_eq!(snap.counters.get("Glass"), 0);
    assert_eq!(probe.pulses(), 200);
    assert_eq!(probe.position(), 0);
    assert!(probe.released());
}

#[test]
fn shutdown_mid_sequence_still_returns_home() {
    let stepper = SimulatedStepper::new();
    let probe = stepper.probe();
    let publisher = StatePublisher::new(LABELS);
    let sort = SortCfg {
        drop_delay: Duration::from_secs(30),
        ..SortCfg::default()
    };
    let act = ActuatorCfg {
        step_delay: Duration::from_micros(5),
        settle: Duration::ZERO,
        ..ActuatorCfg::default()
    };
    let orch = Orchestrator::new(stepper, MonotonicClock::new(), &act, plan(sort), publisher.clone())
        .unwrap();
    let mut worker = SortWorker::spawn(orch);
    let handle = worker.handle();
    assert_eq!(handle.submit(DetectionEvent::new("Carton", 0.9)), Submission::Accepted);

    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.state() != SortState::Settling {
        assert!(Instant::now() < deadline, "never reached the bin");
        std::thread::sleep(Duration::from_millis(2));
    }
    let started = Instant::now();
    worker.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(probe.position(), 0);
    assert!(probe.released());
    assert_eq!(
        handle.submit(DetectionEvent::new("Metal", 0.9)),
        Submission::Rejected(Rejection::Closed)
    );
}
