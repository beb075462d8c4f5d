//! Fill-level sampling end to end: echo script in, published readings out.
use proptest::prelude::*;
use rstest::rstest;
use sorter_core::{BoxedEchoSensor, FillMonitor, SensorCfg, SensorReader, StatePublisher};
use sorter_hardware::SimulatedEchoSensor;
use sorter_traits::clock::MonotonicClock;
use std::time::{Duration, Instant};

fn reader(cfg: SensorCfg, sensor: SimulatedEchoSensor) -> SensorReader {
    SensorReader::new(cfg, vec![("Glass".into(), Box::new(sensor) as BoxedEchoSensor)])
}

#[test]
fn filling_bin_reports_non_decreasing_levels() {
    let cfg = SensorCfg {
        burst: 1,
        window: 3,
        hysteresis_pct: 0.0,
        ..SensorCfg::default()
    };
    let mut r = reader(cfg, SimulatedEchoSensor::filling(48.0, 1.5));
    let mut last = -1.0_f32;
    for _ in 0..30 {
        for reading in r.sample_cycle().changed {
            assert!(reading.percentage >= last, "{} < {last}", reading.percentage);
            assert!((0.0..=100.0).contains(&reading.percentage));
            last = reading.percentage;
        }
    }
    // 48 cm down to 3 cm in a 50 cm bin.
    assert!(last > 80.0, "{last}");
}

#[test]
fn hysteresis_hides_jitter() {
    let cfg = SensorCfg {
        burst: 1,
        window: 1,
        hysteresis_pct: 2.0,
        ..SensorCfg::default()
    };
    // 25.0 / 25.4 / 24.7 cm all round to within 2 points of 50 %.
    let script = vec![Some(25.0), Some(25.4), Some(24.7), Some(25.2)];
    let mut r = reader(cfg, SimulatedEchoSensor::scripted(script));
    let published: usize = (0..8).map(|_| r.sample_cycle().changed.len()).sum();
    assert_eq!(published, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    // One wild reading in an otherwise steady stream never reaches observers,
    // including while the window is still filling.
    #[test]
    fn single_outlier_is_filtered(stable in 5.0f32..45.0, at in 0usize..8) {
        let cfg = SensorCfg {
            burst: 1,
            window: 5,
            hysteresis_pct: 1.0,
            ..SensorCfg::default()
        };
        let mut script = vec![Some(stable); 8];
        // Five times the bin depth, still inside the sensor's range.
        script[at] = Some(250.0);
        let mut r = reader(cfg, SimulatedEchoSensor::scripted(script));
        let mut changed = Vec::new();
        for _ in 0..8 {
            changed.extend(r.sample_cycle().changed);
        }
        prop_assert_eq!(changed.len(), 1);
        let expected = sorter_core::fill::fill_percentage(stable, 50.0);
        prop_assert!((changed[0].percentage - expected).abs() <= 0.2);
    }
}

#[rstest]
#[case(1, 1)]
#[case(3, 3)]
#[case(5, 3)]
fn first_level_waits_for_warm_up(#[case] window: usize, #[case] cycles: usize) {
    let cfg = SensorCfg {
        burst: 1,
        window,
        ..SensorCfg::default()
    };
    let mut r = reader(cfg, SimulatedEchoSensor::constant(25.0));
    assert_eq!(r.warm_up_cycles(), cycles);
    for _ in 1..cycles {
        assert!(r.sample_cycle().changed.is_empty());
    }
    assert_eq!(r.sample_cycle().changed.len(), 1);
}

#[test]
fn monitor_publishes_and_stops_on_drop() {
    let cfg = SensorCfg {
        interval: Duration::from_millis(5),
        ..SensorCfg::default()
    };
    let publisher = StatePublisher::new(["Glass"]);
    let monitor = FillMonitor::spawn(
        reader(cfg, SimulatedEchoSensor::constant(10.0)),
        publisher.clone(),
        MonotonicClock::new(),
    );
    let deadline = Instant::now() + Duration::from_secs(5);
    while !publisher.snapshot().fill_levels.contains_key("Glass") {
        assert!(Instant::now() < deadline, "no fill level published");
        std::thread::sleep(Duration::from_millis(2));
    }
    let started = Instant::now();
    drop(monitor);
    assert!(started.elapsed() < Duration::from_secs(1));
    let level = &publisher.snapshot().fill_levels["Glass"];
    assert!((level.percentage - 80.0).abs() < 0.2, "{}", level.percentage);
}
