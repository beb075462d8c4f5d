//! Echo time to fill percentage, plus the smoothing used on top of it.
use std::collections::VecDeque;
use std::time::Duration;

use crate::error::SorterError;

/// Distance in cm for a round-trip echo time.
#[inline]
pub fn echo_to_distance_cm(echo: Duration, sound_speed_cm_s: f32) -> f32 {
    echo.as_secs_f32() * sound_speed_cm_s / 2.0
}

/// Percentage full for a bin of `depth_cm`, measured `distance_cm` from the
/// sensor. Clamped to [0, 100] and rounded to one decimal; non-increasing
/// in distance.
pub fn fill_percentage(distance_cm: f32, depth_cm: f32) -> f32 {
    if !distance_cm.is_finite() || depth_cm <= 0.0 {
        return 0.0;
    }
    let pct = ((depth_cm - distance_cm) / depth_cm * 100.0).clamp(0.0, 100.0);
    (pct * 10.0).round() / 10.0
}

/// Reject physically impossible distances.
pub fn validate_distance(distance_cm: f32, max_range_cm: f32) -> Result<f32, SorterError> {
    if !distance_cm.is_finite() || distance_cm < 0.0 {
        return Err(SorterError::SensorRead(format!(
            "invalid distance {distance_cm} cm"
        )));
    }
    if distance_cm > max_range_cm {
        return Err(SorterError::SensorRead(format!(
            "distance {distance_cm:.1} cm beyond range {max_range_cm:.1} cm"
        )));
    }
    Ok(distance_cm)
}

/// Median of `values` (mean of the middle pair for even lengths). Reorders
/// the slice.
pub fn median(values: &mut [f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f32::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

/// Median over the last `window` values.
#[derive(Debug, Clone)]
pub struct RollingMedian {
    window: usize,
    buf: VecDeque<f32>,
    scratch: Vec<f32>,
}

impl RollingMedian {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            buf: VecDeque::with_capacity(window),
            scratch: Vec::with_capacity(window),
        }
    }

    /// Push a value and return the median of the current window.
    pub fn push(&mut self, v: f32) -> f32 {
        if self.buf.len() == self.window {
            self.buf.pop_front();
        }
        self.buf.push_back(v);
        self.scratch.clear();
        self.scratch.extend(self.buf.iter().copied());
        median(&mut self.scratch).unwrap_or(v)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Lets a value through only when it moved at least `threshold` from the
/// last value let through.
#[derive(Debug, Clone)]
pub struct HysteresisGate {
    threshold: f32,
    last: Option<f32>,
}

impl HysteresisGate {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            last: None,
        }
    }

    pub fn offer(&mut self, v: f32) -> Option<f32> {
        match self.last {
            Some(prev) if v == prev => None,
            Some(prev) if (v - prev).abs() < self.threshold => None,
            _ => {
                self.last = Some(v);
                Some(v)
            }
        }
    }
}
