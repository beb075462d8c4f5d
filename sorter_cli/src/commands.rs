//! Subcommand implementations.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::Result;
use serde_json::json;
use sorter_config::Config;
use sorter_core::{
    Actuator, ActuatorCfg, Devices, Orchestrator, SensorCfg, SensorReader, SortPlan,
    StatePublisher, SorterError, Subscription, System, SystemCfg,
};
use sorter_core::sensors::CycleReport;
use sorter_traits::FrameSource;
use sorter_traits::clock::MonotonicClock;
use tracing::info;

use crate::devices;

const POLL: Duration = Duration::from_millis(50);

pub fn run(
    cfg: &Config,
    duration_ms: Option<u64>,
    snapshots: bool,
    json_out: bool,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    let sys_cfg = SystemCfg::try_from(cfg)?;
    let on_worker_start = devices::worker_init(sys_cfg.rt_priority);
    let devices = Devices {
        stepper: devices::stepper(cfg)?,
        camera: devices::camera(cfg)?,
        classifier: devices::classifier(cfg),
        sensors: devices::sensors(cfg)?,
    };
    let mut system = System::start(
        sys_cfg,
        devices,
        MonotonicClock::new(),
        on_worker_start,
    )?;
    let sub = snapshots.then(|| system.publisher().subscribe());
    let deadline = duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("interrupt received");
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }
        if let Some(sub) = &sub {
            emit_snapshots(sub)?;
        }
        std::thread::sleep(POLL);
    }

    let report = system.shutdown();
    if let Some(sub) = &sub {
        emit_snapshots(sub)?;
        return Ok(());
    }
    let snap = system.publisher().snapshot();
    if json_out {
        let summary = json!({
            "sorted": snap.counters.total,
            "counters": snap.counters.by_label,
            "fill_levels": snap.fill_levels,
            "frames": report.capture.frames,
            "classified": report.capture.classified,
        });
        println!("{summary}");
    } else {
        println!(
            "sorted {} item(s) from {} frame(s)",
            snap.counters.total, report.capture.frames
        );
        for (label, n) in &snap.counters.by_label {
            println!("  {label}: {n}");
        }
    }
    Ok(())
}

/// Sample until every bin's smoothing window is warm. Levels are the latest
/// per bin; failures come from the final cycle.
fn settled_cycle(reader: &mut SensorReader) -> CycleReport {
    let mut report = CycleReport::default();
    for _ in 0..reader.warm_up_cycles() {
        report = reader.sample_cycle();
    }
    report.changed = reader.levels();
    report
}

fn emit_snapshots(sub: &Subscription) -> Result<()> {
    for snap in sub.try_iter() {
        println!("{}", serde_json::to_string(&*snap)?);
    }
    Ok(())
}

pub fn self_check(cfg: &Config) -> Result<()> {
    let stepper = devices::stepper(cfg)?;
    let mut actuator = Actuator::initialize(stepper, MonotonicClock::new(), &ActuatorCfg::from(&cfg.motor))?;
    actuator.shutdown();
    println!("stepper: ok");

    let mut camera = devices::camera(cfg)?;
    let frame = camera
        .grab()
        .map_err(|e| SorterError::HardwareInit(format!("camera grab: {e}")))?;
    println!("camera: ok ({}x{})", frame.width, frame.height);

    let mut reader = SensorReader::new(SensorCfg::from(&cfg.sensors), devices::sensors(cfg)?);
    let report = settled_cycle(&mut reader);
    for r in &report.changed {
        println!("sensor {}: ok ({:.1} cm)", r.bin, r.distance_cm);
    }
    if let Some((bin, e)) = report.failed.into_iter().next() {
        return Err(SorterError::SensorRead(format!("{bin}: {e}")).into());
    }
    println!("self-check ok");
    Ok(())
}

pub fn jog(cfg: &Config, to: i64) -> Result<()> {
    let sys_cfg = SystemCfg::try_from(cfg)?;
    let home = sys_cfg.bins.home();
    let plan = SortPlan {
        bins: sys_cfg.bins,
        cfg: sys_cfg.sort,
    };
    let mut orch = Orchestrator::new(
        devices::stepper(cfg)?,
        MonotonicClock::new(),
        &sys_cfg.actuator,
        plan,
        StatePublisher::new(sys_cfg.labels),
    )?;
    let out = orch.jog(to)?;
    println!("moved {} -> {} ({} steps)", out.from, out.to, out.pulses);
    orch.jog(home)?;
    println!("back at home ({home})");
    orch.shutdown();
    Ok(())
}

pub fn measure(cfg: &Config, json_out: bool) -> Result<()> {
    if cfg.sensors.bins.is_empty() {
        return Err(SorterError::Config("no [[sensors.bins]] configured".into()).into());
    }
    let mut reader = SensorReader::new(SensorCfg::from(&cfg.sensors), devices::sensors(cfg)?);
    let report = settled_cycle(&mut reader);
    if json_out {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(bin, e)| json!({ "bin": bin, "error": e.to_string() }))
            .collect();
        println!("{}", json!({ "levels": report.changed, "failed": failed }));
    } else {
        for r in &report.changed {
            println!("{}: {:.1}% ({:.1} cm)", r.bin, r.percentage, r.distance_cm);
        }
        for (bin, e) in &report.failed {
            println!("{bin}: no reading ({e})");
        }
    }
    Ok(())
}
