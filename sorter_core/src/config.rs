//! Runtime configuration for the sorting engine.
//!
//! These are separate from the TOML-deserialized config in `sorter_config`;
//! see `conversions` for the bridge.
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::SorterError;

/// Linear acceleration ramp from `start_delay` down to the cruise delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ramp {
    pub start_delay: Duration,
    pub accel_steps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorCfg {
    /// Half-period of one step pulse at cruise speed.
    pub step_delay: Duration,
    /// Pause after enabling the driver and after changing direction.
    pub settle: Duration,
    /// Cut driver power after every move (less holding torque, cooler motor).
    pub disable_after_move: bool,
    pub ramp: Option<Ramp>,
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            step_delay: Duration::from_millis(5),
            settle: Duration::from_millis(10),
            disable_after_move: false,
            ramp: None,
        }
    }
}

/// Timing and admission rules for one sort sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct SortCfg {
    pub min_confidence: f32,
    /// Wait at the bin so the item can fall.
    pub drop_delay: Duration,
    /// Pause at home before the next sequence may start.
    pub home_dwell: Duration,
}

impl Default for SortCfg {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            drop_delay: Duration::from_millis(2000),
            home_dwell: Duration::from_millis(500),
        }
    }
}

/// Label to absolute step position. Every configured label has an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinMap {
    home: i64,
    positions: BTreeMap<String, i64>,
}

impl BinMap {
    /// Build the map, refusing labels that have no position.
    pub fn new(
        home: i64,
        positions: BTreeMap<String, i64>,
        labels: &[String],
    ) -> Result<Self, SorterError> {
        if let Some(missing) = labels.iter().find(|l| !positions.contains_key(*l)) {
            return Err(SorterError::Config(format!(
                "no bin position for label {missing:?}"
            )));
        }
        Ok(Self { home, positions })
    }

    pub fn home(&self) -> i64 {
        self.home
    }

    pub fn position(&self, label: &str) -> Option<i64> {
        self.positions.get(label).copied()
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.positions.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCfg {
    /// Frames are downscaled to at most this width before classification.
    pub frame_width: u32,
    /// Classify one frame in every `skip_frames + 1`.
    pub skip_frames: u32,
    /// Lower bound on the time between two classifications.
    pub min_inference_interval: Duration,
    pub retry_backoff: Duration,
    /// Reopen the camera after this many consecutive failed grabs.
    pub reopen_after: u32,
    /// Do not resubmit the label already submitted until the scene clears.
    pub suppress_repeats: bool,
    /// Below this a result counts as an empty scene.
    pub min_confidence: f32,
}

impl Default for CaptureCfg {
    fn default() -> Self {
        Self {
            frame_width: 640,
            skip_frames: 1,
            min_inference_interval: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(1000),
            reopen_after: 5,
            suppress_repeats: true,
            min_confidence: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SensorCfg {
    pub bin_depth_cm: f32,
    pub sound_speed_cm_s: f32,
    /// Pings per measurement; the median of the valid ones is used.
    pub burst: usize,
    /// Rolling median window over measurements.
    pub window: usize,
    pub interval: Duration,
    pub read_timeout: Duration,
    pub max_range_cm: f32,
    /// Minimum change in percentage points before a new level is published.
    pub hysteresis_pct: f32,
    /// Consecutive failed cycles before the sensors are reported unhealthy.
    pub fail_after: u32,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            bin_depth_cm: 50.0,
            sound_speed_cm_s: 34_300.0,
            burst: 3,
            window: 5,
            interval: Duration::from_millis(5000),
            read_timeout: Duration::from_millis(500),
            max_range_cm: 400.0,
            hysteresis_pct: 1.0,
            fail_after: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bin_map_requires_every_label() {
        let positions = BTreeMap::from([("Glass".to_string(), 200_i64)]);
        let labels = vec!["Glass".to_string(), "Metal".to_string()];
        let err = BinMap::new(0, positions.clone(), &labels).unwrap_err();
        assert!(err.to_string().contains("Metal"));
        let map = BinMap::new(0, positions, &labels[..1]).unwrap();
        assert_eq!(map.position("Glass"), Some(200));
        assert_eq!(map.position("Paper"), None);
    }
}
