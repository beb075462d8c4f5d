//! Actuator positioning properties against the simulated driver.
use proptest::prelude::*;
use sorter_core::{Actuator, ActuatorCfg, Ramp, SorterError};
use sorter_hardware::SimulatedStepper;
use sorter_traits::clock::test_clock::TestClock;
use std::time::Duration;

fn cfg() -> ActuatorCfg {
    ActuatorCfg {
        step_delay: Duration::from_micros(50),
        settle: Duration::ZERO,
        ..ActuatorCfg::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Any sequence of absolute targets ends exactly where the last one says,
    // and the driver's own count agrees.
    #[test]
    fn no_drift_over_move_sequences(targets in prop::collection::vec(-300i64..300, 1..12)) {
        let stepper = SimulatedStepper::new().with_enable();
        let probe = stepper.probe();
        let mut act = Actuator::initialize(stepper, TestClock::new(), &cfg()).unwrap();
        let mut pulses = 0u64;
        let mut at = 0i64;
        for &t in &targets {
            let rep = act.move_to(t).unwrap();
            prop_assert_eq!(rep.pulses, (t - at).unsigned_abs());
            pulses += rep.pulses;
            at = t;
            prop_assert_eq!(act.position(), t);
            prop_assert_eq!(probe.position(), t);
        }
        prop_assert_eq!(probe.pulses(), pulses);
    }
}

#[test]
fn zero_delta_move_touches_nothing() {
    let stepper = SimulatedStepper::new().with_enable();
    let probe = stepper.probe();
    let clock = TestClock::new();
    let mut act = Actuator::initialize(stepper, clock.clone(), &cfg()).unwrap();
    let rep = act.move_to(0).unwrap();
    assert_eq!(rep.pulses, 0);
    assert_eq!(probe.pulses(), 0);
    assert_eq!(probe.enable_toggles(), 0);
    assert!(clock.sleeps().is_empty());
}

#[test]
fn fault_reports_position_reached() {
    let stepper = SimulatedStepper::new().with_enable().fail_after(37);
    let probe = stepper.probe();
    let mut act = Actuator::initialize(stepper, TestClock::new(), &cfg()).unwrap();
    let err = act.move_to(100).unwrap_err();
    match err {
        SorterError::ActuatorFault { reached, ref message } => {
            assert_eq!(reached, 37);
            assert!(message.contains("stepper fault"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(act.position(), 37);
    assert_eq!(probe.position(), 37);
    // The driver was disabled on the fault.
    assert!(!probe.enabled());
    assert!(!act.is_enabled());
}

#[test]
fn ramped_move_is_slower_than_cruise_alone() {
    let ramped = ActuatorCfg {
        ramp: Some(Ramp {
            start_delay: Duration::from_micros(500),
            accel_steps: 10,
        }),
        ..cfg()
    };
    let clock = TestClock::new();
    let mut act = Actuator::initialize(SimulatedStepper::new(), clock.clone(), &ramped).unwrap();
    act.move_to(100).unwrap();
    let cruise_only = Duration::from_micros(50) * 200;
    assert!(clock.elapsed() > cruise_only);
    assert_eq!(act.position(), 100);
}

#[test]
fn shutdown_is_idempotent_and_releases_once() {
    let stepper = SimulatedStepper::new().with_enable();
    let probe = stepper.probe();
    let mut act = Actuator::initialize(stepper, TestClock::new(), &cfg()).unwrap();
    act.move_to(10).unwrap();
    act.shutdown();
    act.shutdown();
    drop(act);
    assert_eq!(probe.release_calls(), 1);
    assert!(probe.released());
    assert!(!probe.enabled());
}
