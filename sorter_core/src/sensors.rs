//! Periodic fill-level sampling of every bin.
//!
//! `SensorReader` does one pass over the sensors; `FillMonitor` runs it on a
//! background thread at the configured interval. A failed bin keeps its last
//! good reading.
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use sorter_traits::EchoSensor;
use sorter_traits::clock::Clock;
use tracing::{debug, trace, warn};

use crate::config::SensorCfg;
use crate::error::SorterError;
use crate::fill::{
    HysteresisGate, RollingMedian, echo_to_distance_cm, fill_percentage, median, validate_distance,
};
use crate::hw_error::map_hw_error;
use crate::publisher::StatePublisher;
use crate::status::{Component, Health};
use crate::types::FillLevelReading;
use crate::util::{SHUTDOWN_POLL, now_unix_ms};

pub type BoxedEchoSensor = Box<dyn EchoSensor + Send>;

/// Samples a rolling window needs before its median can outvote one outlier.
const MIN_SAMPLES_TO_PUBLISH: usize = 3;

struct BinSensor {
    name: String,
    sensor: BoxedEchoSensor,
    window: RollingMedian,
    gate: HysteresisGate,
    last: Option<FillLevelReading>,
    failures: u32,
}

/// Result of one pass over all bins.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Readings that moved past the hysteresis threshold.
    pub changed: Vec<FillLevelReading>,
    pub failed: Vec<(String, SorterError)>,
}

pub struct SensorReader {
    cfg: SensorCfg,
    bins: Vec<BinSensor>,
}

impl SensorReader {
    pub fn new(cfg: SensorCfg, sensors: Vec<(String, BoxedEchoSensor)>) -> Self {
        let bins = sensors
            .into_iter()
            .map(|(name, sensor)| BinSensor {
                name,
                sensor,
                window: RollingMedian::new(cfg.window),
                gate: HysteresisGate::new(cfg.hysteresis_pct),
                last: None,
                failures: 0,
            })
            .collect();
        Self { cfg, bins }
    }

    /// Successful cycles before a bin publishes its first level.
    pub fn warm_up_cycles(&self) -> usize {
        self.cfg.window.clamp(1, MIN_SAMPLES_TO_PUBLISH)
    }

    pub fn bin_names(&self) -> impl Iterator<Item = &str> {
        self.bins.iter().map(|b| b.name.as_str())
    }

    /// One burst on bin `idx`: the median of the valid pings, in cm.
    pub fn measure_distance(&mut self, idx: usize) -> Result<f32, SorterError> {
        let cfg = &self.cfg;
        let bin = self
            .bins
            .get_mut(idx)
            .ok_or_else(|| SorterError::State(format!("no sensor at index {idx}")))?;
        let mut valid = Vec::with_capacity(cfg.burst);
        let mut last_err = None;
        for _ in 0..cfg.burst.max(1) {
            let d = bin
                .sensor
                .ping(cfg.read_timeout)
                .map_err(|e| map_hw_error(&*e))
                .map(|echo| echo_to_distance_cm(echo, cfg.sound_speed_cm_s))
                .and_then(|d| validate_distance(d, cfg.max_range_cm));
            match d {
                Ok(d) => valid.push(d),
                Err(e) => {
                    trace!(bin = %bin.name, error = %e, "ping rejected");
                    last_err = Some(e);
                }
            }
        }
        median(&mut valid).ok_or_else(|| {
            last_err.unwrap_or_else(|| SorterError::SensorRead("no valid echo".into()))
        })
    }

    /// Sample every bin once.
    pub fn sample_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for idx in 0..self.bins.len() {
            let measured = self.measure_distance(idx);
            let depth = self.cfg.bin_depth_cm;
            let warm_up = self.warm_up_cycles();
            let bin = &mut self.bins[idx];
            match measured {
                Ok(d) => {
                    bin.failures = 0;
                    let smoothed = bin.window.push(d);
                    if bin.window.len() < warm_up {
                        trace!(bin = %bin.name, samples = bin.window.len(), "window warming up");
                        continue;
                    }
                    let percentage = fill_percentage(smoothed, depth);
                    if bin.gate.offer(percentage).is_some() {
                        let reading = FillLevelReading {
                            bin: bin.name.clone(),
                            percentage,
                            distance_cm: smoothed,
                            sampled_at_ms: now_unix_ms(),
                        };
                        debug!(bin = %bin.name, percentage, distance_cm = smoothed, "fill level changed");
                        bin.last = Some(reading.clone());
                        report.changed.push(reading);
                    }
                }
                Err(e) => {
                    bin.failures = bin.failures.saturating_add(1);
                    warn!(bin = %bin.name, failures = bin.failures, error = %e, "fill read failed; keeping last value");
                    report.failed.push((bin.name.clone(), e));
                }
            }
        }
        report
    }

    /// Last published reading per bin, if any.
    pub fn levels(&self) -> Vec<FillLevelReading> {
        self.bins.iter().filter_map(|b| b.last.clone()).collect()
    }

    /// Bins that have failed at least `fail_after` cycles in a row.
    pub fn persistent_failures(&self) -> Vec<(&str, u32)> {
        self.bins
            .iter()
            .filter(|b| b.failures >= self.cfg.fail_after)
            .map(|b| (b.name.as_str(), b.failures))
            .collect()
    }

    fn health(&self) -> Health {
        let failing = self.persistent_failures();
        if failing.is_empty() {
            return Health::Ok;
        }
        let names: Vec<String> = failing
            .iter()
            .map(|(n, k)| format!("{n} ({k} cycles)"))
            .collect();
        Health::Error(format!("no echo from {}", names.join(", ")))
    }
}

/// Background thread running `SensorReader::sample_cycle` periodically and
/// feeding the publisher. Stopped on drop.
pub struct FillMonitor {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl FillMonitor {
    pub fn spawn<C: Clock + Send + 'static>(
        mut reader: SensorReader,
        publisher: StatePublisher,
        clock: C,
    ) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let interval = reader.cfg.interval;
        let join_handle = std::thread::Builder::new()
            .name("fill-monitor".into())
            .spawn(move || {
                loop {
                    if flag.load(Ordering::Relaxed) {
                        break;
                    }
                    let report = reader.sample_cycle();
                    for r in report.changed {
                        publisher.set_fill_level(r);
                    }
                    publisher.set_health(Component::Sensors, reader.health());

                    let keep = flag.clone();
                    if !clock.sleep_while(interval, SHUTDOWN_POLL, &move || !keep.load(Ordering::Relaxed)) {
                        break;
                    }
                }
                trace!("fill monitor exiting cleanly");
            });
        let join_handle = match join_handle {
            Ok(j) => Some(j),
            Err(e) => {
                warn!(error = %e, "failed to spawn fill monitor");
                None
            }
        };
        Self {
            shutdown,
            join_handle,
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(h) = self.join_handle.take() {
            if let Err(e) = h.join() {
                warn!(?e, "fill monitor panicked during shutdown");
            }
        }
    }
}

impl Drop for FillMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
