#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the sorting appliance.
//!
//! - `Config` and its sections are deserialized from TOML and validated once at
//!   startup; the running system treats the result as immutable.
//! - Bin positions may be keyed by label or by the classifier's class index
//!   (`"0"`, `"1"`, ...); `bin_positions()` resolves both to labels.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Deserialize;

/// Largest absolute step position accepted for a bin or for home.
pub const MAX_POSITION_STEPS: u64 = 10_000_000;

#[derive(Debug, Deserialize)]
pub struct Pins {
    pub step: u8,
    pub dir: u8,
    /// Active-low enable line; absent when EN is tied to ground.
    pub enable: Option<u8>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RampCfg {
    /// Half-period of the first and last pulse of a move.
    pub start_delay_us: u64,
    /// Pulses spent accelerating (and again decelerating).
    pub accel_steps: u32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotorCfg {
    /// Half-period of one step pulse (high time == low time).
    pub step_delay_us: u64,
    /// Pause after energizing the stage and after setting direction.
    pub direction_settle_us: u64,
    /// De-energize after every move instead of holding torque.
    pub disable_after_move: bool,
    pub invert_direction: bool,
    /// SCHED_FIFO priority for the actuator thread (needs the `rt` build).
    pub rt_priority: Option<i32>,
    pub ramp: Option<RampCfg>,
}

impl Default for MotorCfg {
    fn default() -> Self {
        Self {
            step_delay_us: 5_000,
            direction_settle_us: 10_000,
            disable_after_move: false,
            invert_direction: false,
            rt_priority: None,
            ramp: None,
        }
    }
}

fn default_min_confidence() -> f32 {
    0.5
}

#[derive(Debug, Deserialize)]
pub struct ClassifierCfg {
    /// Every label the classifier can emit, in class-index order.
    pub labels: Vec<String>,
    /// Opaque model reference handed to the classifier backend.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
}

#[derive(Debug, Deserialize)]
pub struct Bins {
    /// Logical zero the actuator returns to after each sort.
    #[serde(default)]
    pub home: i64,
    /// Label (or class index) -> target step position.
    pub positions: BTreeMap<String, i64>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SorterCfg {
    /// Time for the item to fall into the bin before returning home.
    pub drop_delay_ms: u64,
    /// Pause after the return-home move before accepting the next item.
    pub home_dwell_ms: u64,
}

impl Default for SorterCfg {
    fn default() -> Self {
        Self {
            drop_delay_ms: 2_000,
            home_dwell_ms: 500,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CaptureCfg {
    pub camera_index: u32,
    /// Capture resolution requested from the camera.
    pub resolution: (u32, u32),
    pub fps: u32,
    /// Downscale frames to this width before inference (0 = off).
    pub frame_width: u32,
    /// Classify only every `skip_frames + 1`-th frame.
    pub skip_frames: u32,
    pub max_inference_hz: u32,
    pub retry_backoff_ms: u64,
    /// Consecutive failed grabs before the camera is reopened.
    pub reopen_after: u32,
    /// Do not resubmit the label just handed off until the scene clears.
    pub suppress_repeats: bool,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            camera_index: 0,
            resolution: (640, 480),
            fps: 30,
            frame_width: 640,
            skip_frames: 1,
            max_inference_hz: 10,
            retry_backoff_ms: 1_000,
            reopen_after: 5,
            suppress_repeats: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorBin {
    pub name: String,
    pub trig: u8,
    pub echo: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorsCfg {
    pub bin_depth_cm: f32,
    pub sound_speed_cm_s: f32,
    /// When set, the speed of sound is derived from the ambient temperature.
    pub temperature_c: Option<f32>,
    /// Pings per measurement; their median is one sample.
    pub burst: usize,
    /// Rolling median window across measurements.
    pub window: usize,
    pub interval_ms: u64,
    pub read_timeout_ms: u64,
    pub max_range_cm: f32,
    /// Minimum change in percentage points before a new level is published.
    pub hysteresis_pct: f32,
    /// Consecutive failed cycles before the sensors are reported in error.
    pub fail_after: u32,
    pub bins: Vec<SensorBin>,
}

impl Default for SensorsCfg {
    fn default() -> Self {
        Self {
            bin_depth_cm: 50.0,
            sound_speed_cm_s: 34_300.0,
            temperature_c: None,
            burst: 3,
            window: 5,
            interval_ms: 5_000,
            read_timeout_ms: 500,
            max_range_cm: 400.0,
            hysteresis_pct: 1.0,
            fail_after: 3,
            bins: Vec::new(),
        }
    }
}

impl SensorsCfg {
    /// Effective speed of sound in cm/s.
    pub fn speed_of_sound_cm_s(&self) -> f32 {
        match self.temperature_c {
            Some(t) => (331.3 + 0.606 * t) * 100.0,
            None => self.sound_speed_cm_s,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    pub pins: Pins,
    #[serde(default)]
    pub motor: MotorCfg,
    pub classifier: ClassifierCfg,
    pub bins: Bins,
    #[serde(default)]
    pub sorter: SorterCfg,
    #[serde(default)]
    pub capture: CaptureCfg,
    #[serde(default)]
    pub sensors: SensorsCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Read, parse and validate a config file.
pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {e}", path.display()))?;
    let cfg = load_toml(&text).map_err(|e| eyre::eyre!("invalid configuration: {e}"))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    /// Label -> step position, resolving class-index keys through
    /// `classifier.labels`. Fails on keys that name no known label.
    pub fn bin_positions(&self) -> eyre::Result<BTreeMap<String, i64>> {
        let mut out = BTreeMap::new();
        for (key, &steps) in &self.bins.positions {
            let label = if self.classifier.labels.iter().any(|l| l == key) {
                key.clone()
            } else if let Ok(idx) = key.parse::<usize>() {
                match self.classifier.labels.get(idx) {
                    Some(l) => l.clone(),
                    None => eyre::bail!(
                        "bins.positions key {key:?} is not a valid class index (have {} labels)",
                        self.classifier.labels.len()
                    ),
                }
            } else {
                eyre::bail!("bins.positions has an entry for unknown label {key:?}");
            };
            if out.insert(label.clone(), steps).is_some() {
                eyre::bail!("bins.positions maps label {label:?} twice");
            }
        }
        Ok(out)
    }

    pub fn validate(&self) -> eyre::Result<()> {
        // Motor
        if self.motor.step_delay_us == 0 {
            eyre::bail!("motor.step_delay_us must be >= 1");
        }
        if self.motor.step_delay_us > 1_000_000 {
            eyre::bail!("motor.step_delay_us is unreasonably large (>1s)");
        }
        if self.motor.direction_settle_us > 1_000_000 {
            eyre::bail!("motor.direction_settle_us is unreasonably large (>1s)");
        }
        if let Some(ramp) = self.motor.ramp {
            if ramp.accel_steps == 0 {
                eyre::bail!("motor.ramp.accel_steps must be >= 1");
            }
            if ramp.start_delay_us < self.motor.step_delay_us {
                eyre::bail!("motor.ramp.start_delay_us must be >= motor.step_delay_us");
            }
        }

        // Classifier
        if self.classifier.labels.is_empty() {
            eyre::bail!("classifier.labels must list at least one label");
        }
        let mut seen = BTreeSet::new();
        for l in &self.classifier.labels {
            if l.trim().is_empty() {
                eyre::bail!("classifier.labels must not contain empty labels");
            }
            if !seen.insert(l.as_str()) {
                eyre::bail!("classifier.labels lists {l:?} twice");
            }
        }
        if !(0.0..=1.0).contains(&self.classifier.min_confidence) {
            eyre::bail!("classifier.min_confidence must be in [0.0, 1.0]");
        }

        // Bins: every label the classifier can emit needs a position
        if self.bins.home.unsigned_abs() > MAX_POSITION_STEPS {
            eyre::bail!("bins.home must be within +/-{MAX_POSITION_STEPS} steps");
        }
        let positions = self.bin_positions()?;
        if let Some((label, p)) = positions
            .iter()
            .find(|(_, p)| p.unsigned_abs() > MAX_POSITION_STEPS)
        {
            eyre::bail!("bins.positions {label:?} = {p} is beyond +/-{MAX_POSITION_STEPS} steps");
        }
        for l in &self.classifier.labels {
            if !positions.contains_key(l) {
                eyre::bail!("bins.positions is missing label {l:?}");
            }
        }

        // Sorter
        if self.sorter.drop_delay_ms > 60_000 {
            eyre::bail!("sorter.drop_delay_ms is unreasonably large (>60s)");
        }
        if self.sorter.home_dwell_ms > 60_000 {
            eyre::bail!("sorter.home_dwell_ms is unreasonably large (>60s)");
        }

        // Capture
        if self.capture.fps == 0 {
            eyre::bail!("capture.fps must be > 0");
        }
        if self.capture.resolution.0 == 0 || self.capture.resolution.1 == 0 {
            eyre::bail!("capture.resolution must be non-zero");
        }
        if self.capture.max_inference_hz == 0 {
            eyre::bail!("capture.max_inference_hz must be > 0");
        }
        if self.capture.retry_backoff_ms == 0 {
            eyre::bail!("capture.retry_backoff_ms must be >= 1");
        }
        if self.capture.reopen_after == 0 {
            eyre::bail!("capture.reopen_after must be >= 1");
        }

        // Sensors
        let s = &self.sensors;
        if !(s.bin_depth_cm.is_finite() && s.bin_depth_cm > 0.0) {
            eyre::bail!("sensors.bin_depth_cm must be > 0");
        }
        if let Some(t) = s.temperature_c
            && !(-40.0..=85.0).contains(&t)
        {
            eyre::bail!("sensors.temperature_c must be in [-40, 85]");
        }
        if !(s.speed_of_sound_cm_s().is_finite() && s.speed_of_sound_cm_s() > 0.0) {
            eyre::bail!("sensors.sound_speed_cm_s must be > 0");
        }
        if s.burst == 0 {
            eyre::bail!("sensors.burst must be >= 1");
        }
        if s.window == 0 {
            eyre::bail!("sensors.window must be >= 1");
        }
        if s.window == 2 {
            eyre::bail!("sensors.window must be 1 or >= 3 (two samples cannot outvote an outlier)");
        }
        if s.interval_ms == 0 {
            eyre::bail!("sensors.interval_ms must be >= 1");
        }
        if s.read_timeout_ms == 0 {
            eyre::bail!("sensors.read_timeout_ms must be >= 1");
        }
        if !(s.max_range_cm.is_finite() && s.max_range_cm > 0.0) {
            eyre::bail!("sensors.max_range_cm must be > 0");
        }
        if !(0.0..100.0).contains(&s.hysteresis_pct) {
            eyre::bail!("sensors.hysteresis_pct must be in [0, 100)");
        }
        if s.fail_after == 0 {
            eyre::bail!("sensors.fail_after must be >= 1");
        }
        let mut names = BTreeSet::new();
        for b in &s.bins {
            if !names.insert(b.name.as_str()) {
                eyre::bail!("sensors.bins lists {:?} twice", b.name);
            }
            if b.trig == b.echo {
                eyre::bail!("sensors.bins {:?}: trig and echo must differ", b.name);
            }
        }

        // Logging
        if let Some(r) = self.logging.rotation.as_deref()
            && !matches!(r, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
