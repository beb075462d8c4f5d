//! Whole-system start and shutdown with simulated devices.
use sorter_core::{
    ActuatorCfg, BinMap, CaptureCfg, Devices, SensorCfg, SortCfg, SortState, SorterError,
    System, SystemCfg, SystemStatus,
};
use sorter_hardware::{ScriptedClassifier, SimulatedCamera, SimulatedEchoSensor, SimulatedStepper};
use sorter_traits::clock::MonotonicClock;
use sorter_traits::{BoxError, Direction, Stepper};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

fn cfg() -> SystemCfg {
    let labels: Vec<String> = vec!["Metal".into(), "Glass".into()];
    let positions = BTreeMap::from([("Metal".to_string(), 40_i64), ("Glass".to_string(), -40)]);
    SystemCfg {
        bins: BinMap::new(0, positions, &labels).unwrap(),
        labels,
        actuator: ActuatorCfg {
            step_delay: Duration::from_micros(10),
            settle: Duration::ZERO,
            ..ActuatorCfg::default()
        },
        sort: SortCfg {
            drop_delay: Duration::from_millis(5),
            home_dwell: Duration::from_millis(5),
            ..SortCfg::default()
        },
        capture: CaptureCfg {
            skip_frames: 0,
            min_inference_interval: Duration::from_millis(1),
            ..CaptureCfg::default()
        },
        sensors: SensorCfg {
            interval: Duration::from_millis(10),
            ..SensorCfg::default()
        },
        rt_priority: None,
    }
}

fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn sorts_detections_from_the_camera() {
    let stepper = SimulatedStepper::new().with_enable();
    let probe = stepper.probe();
    let labels = vec!["Metal".to_string(), "Glass".to_string()];
    let devices = Devices {
        stepper,
        camera: SimulatedCamera::new(320, 240).with_frame_delay(Duration::from_millis(2)),
        classifier: ScriptedClassifier::round_robin(&labels, 4, 0.9),
        sensors: vec![(
            "Metal".to_string(),
            Box::new(SimulatedEchoSensor::constant(25.0)) as sorter_core::BoxedEchoSensor,
        )],
    };
    let started = Arc::new(AtomicBool::new(false));
    let flag = started.clone();
    let mut sys = System::start(cfg(), devices, MonotonicClock::new(), move || {
        flag.store(true, Ordering::SeqCst);
    })
    .unwrap();
    let publisher = sys.publisher().clone();

    wait_for("two sorts", || publisher.snapshot().counters.total >= 2);
    assert!(started.load(Ordering::SeqCst));
    wait_for("fill level", || publisher.snapshot().fill_levels.contains_key("Metal"));
    assert_eq!(publisher.snapshot().status, SystemStatus::Active);

    let report = sys.shutdown();
    assert!(report.capture.frames > 0);
    assert!(report.capture.submitted >= 2);
    // Second call is a no-op returning the same report.
    assert_eq!(sys.shutdown(), report);

    let snap = publisher.snapshot();
    assert_eq!(snap.status, SystemStatus::Inactive);
    assert_eq!(snap.sort_state, SortState::Idle);
    assert_eq!(probe.position(), 0);
    assert_eq!(probe.release_calls(), 1);
}

#[test]
fn camera_outage_shows_as_error_then_recovers() {
    let camera = SimulatedCamera::new(64, 48).with_frame_delay(Duration::from_millis(1));
    let cam = camera.probe();
    cam.set_connected(false);
    let mut c = cfg();
    c.capture.retry_backoff = Duration::from_millis(5);
    c.capture.reopen_after = 2;
    let devices = Devices {
        stepper: SimulatedStepper::new(),
        camera,
        classifier: ScriptedClassifier::new(vec![None]),
        sensors: Vec::new(),
    };
    let sys = System::start(c, devices, MonotonicClock::new(), || {}).unwrap();
    let publisher = sys.publisher().clone();

    wait_for("camera error", || publisher.snapshot().status == SystemStatus::Error);
    assert!(publisher.snapshot().message.contains("camera unavailable"));
    wait_for("reopen attempt", || cam.reopens() >= 1);

    cam.set_connected(true);
    wait_for("recovery", || publisher.snapshot().status == SystemStatus::Active);
    drop(sys);
    assert_eq!(publisher.snapshot().status, SystemStatus::Inactive);
}

struct DeadDriver;

impl Stepper for DeadDriver {
    fn set_direction(&mut self, _dir: Direction) -> Result<(), BoxError> {
        Ok(())
    }
    fn set_step(&mut self, _high: bool) -> Result<(), BoxError> {
        Err("step line not exported".into())
    }
}

#[test]
fn actuator_init_failure_is_fatal() {
    let devices = Devices {
        stepper: DeadDriver,
        camera: SimulatedCamera::new(64, 48),
        classifier: ScriptedClassifier::new(vec![None]),
        sensors: Vec::new(),
    };
    let err = System::start(cfg(), devices, MonotonicClock::new(), || {})
        .err()
        .expect("start must fail");
    assert!(matches!(err, SorterError::HardwareInit(ref m) if m.contains("step line")), "{err}");
}
