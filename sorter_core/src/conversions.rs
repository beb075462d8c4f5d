//! `From` implementations bridging `sorter_config` types to `sorter_core` types.

use std::time::Duration;

use crate::config::{ActuatorCfg, BinMap, CaptureCfg, Ramp, SensorCfg, SortCfg};
use crate::error::SorterError;
use crate::system::SystemCfg;
use crate::util::period;

// ── ActuatorCfg ──────────────────────────────────────────────────────────────

impl From<&sorter_config::MotorCfg> for ActuatorCfg {
    fn from(c: &sorter_config::MotorCfg) -> Self {
        Self {
            step_delay: Duration::from_micros(c.step_delay_us.max(1)),
            settle: Duration::from_micros(c.direction_settle_us),
            disable_after_move: c.disable_after_move,
            ramp: c.ramp.map(|r| Ramp {
                start_delay: Duration::from_micros(r.start_delay_us),
                accel_steps: r.accel_steps,
            }),
        }
    }
}

// ── SortCfg ──────────────────────────────────────────────────────────────────

impl From<&sorter_config::Config> for SortCfg {
    fn from(c: &sorter_config::Config) -> Self {
        Self {
            min_confidence: c.classifier.min_confidence,
            drop_delay: Duration::from_millis(c.sorter.drop_delay_ms),
            home_dwell: Duration::from_millis(c.sorter.home_dwell_ms),
        }
    }
}

// ── CaptureCfg ───────────────────────────────────────────────────────────────

impl From<&sorter_config::Config> for CaptureCfg {
    fn from(c: &sorter_config::Config) -> Self {
        let cap = &c.capture;
        Self {
            frame_width: cap.frame_width,
            skip_frames: cap.skip_frames,
            min_inference_interval: period(cap.max_inference_hz),
            retry_backoff: Duration::from_millis(cap.retry_backoff_ms),
            reopen_after: cap.reopen_after.max(1),
            suppress_repeats: cap.suppress_repeats,
            min_confidence: c.classifier.min_confidence,
        }
    }
}

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&sorter_config::SensorsCfg> for SensorCfg {
    fn from(c: &sorter_config::SensorsCfg) -> Self {
        Self {
            bin_depth_cm: c.bin_depth_cm,
            sound_speed_cm_s: c.speed_of_sound_cm_s(),
            burst: c.burst.max(1),
            window: c.window.max(1),
            interval: Duration::from_millis(c.interval_ms),
            read_timeout: Duration::from_millis(c.read_timeout_ms),
            max_range_cm: c.max_range_cm,
            hysteresis_pct: c.hysteresis_pct,
            fail_after: c.fail_after.max(1),
        }
    }
}

// ── BinMap / SystemCfg ───────────────────────────────────────────────────────

impl TryFrom<&sorter_config::Config> for BinMap {
    type Error = SorterError;

    fn try_from(c: &sorter_config::Config) -> Result<Self, Self::Error> {
        let positions = c
            .bin_positions()
            .map_err(|e| SorterError::Config(e.to_string()))?;
        BinMap::new(c.bins.home, positions, &c.classifier.labels)
    }
}

impl TryFrom<&sorter_config::Config> for SystemCfg {
    type Error = SorterError;

    fn try_from(c: &sorter_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            labels: c.classifier.labels.clone(),
            bins: BinMap::try_from(c)?,
            actuator: ActuatorCfg::from(&c.motor),
            sort: SortCfg::from(c),
            capture: CaptureCfg::from(c),
            sensors: SensorCfg::from(&c.sensors),
            rt_priority: c.motor.rt_priority,
        })
    }
}
