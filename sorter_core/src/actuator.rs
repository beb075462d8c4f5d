//! Stepper actuator: absolute positioning by counted pulses.
//!
//! The actuator owns the `Stepper` and is the only thing that drives it.
//! Position is tracked per completed pulse, so a fault part-way through a
//! move still leaves an exact record of where the carriage stopped.
use std::time::Duration;

use sorter_traits::clock::Clock;
use sorter_traits::{BoxError, Direction, Stepper};
use tracing::{debug, info, warn};

use crate::config::ActuatorCfg;
use crate::error::SorterError;
use crate::hw_error::hw_message;

/// Half-period of each pulse within a move.
pub trait StepProfile: Send {
    /// Half-period before pulse `i` (0-based) of a move of `n` pulses.
    fn half_period(&self, i: u64, n: u64) -> Duration;
}

/// Constant speed.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl StepProfile for FixedDelay {
    fn half_period(&self, _i: u64, _n: u64) -> Duration {
        self.0
    }
}

/// Linear acceleration from `start` to `cruise` over `accel_steps` pulses,
/// mirrored for deceleration. Short moves get a triangular profile.
#[derive(Debug, Clone, Copy)]
pub struct Trapezoid {
    pub start: Duration,
    pub cruise: Duration,
    pub accel_steps: u64,
}

impl StepProfile for Trapezoid {
    fn half_period(&self, i: u64, n: u64) -> Duration {
        let ramp = self.accel_steps.min(n / 2);
        let from_edge = i.min(n.saturating_sub(1).saturating_sub(i));
        if ramp == 0 || from_edge >= ramp || self.start <= self.cruise {
            return self.cruise;
        }
        let span = (self.start - self.cruise).as_nanos();
        // Integer interpolation; from_edge < ramp so the result stays above cruise.
        let cut = span * u128::from(from_edge) / u128::from(ramp);
        let nanos = self.start.as_nanos().saturating_sub(cut);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

pub fn profile_for(cfg: &ActuatorCfg) -> Box<dyn StepProfile> {
    match cfg.ramp {
        Some(r) => Box::new(Trapezoid {
            start: r.start_delay,
            cruise: cfg.step_delay,
            accel_steps: u64::from(r.accel_steps),
        }),
        None => Box::new(FixedDelay(cfg.step_delay)),
    }
}

/// Outcome of a completed move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveReport {
    pub from: i64,
    pub to: i64,
    pub pulses: u64,
}

pub struct Actuator<S: Stepper, C: Clock> {
    stepper: S,
    clock: C,
    profile: Box<dyn StepProfile>,
    settle: Duration,
    disable_after_move: bool,
    position: i64,
    enabled: bool,
    released: bool,
}

impl<S: Stepper, C: Clock> Actuator<S, C> {
    /// Take ownership of the stepper. The boot position is logical zero and
    /// the driver starts disabled.
    pub fn initialize(mut stepper: S, clock: C, cfg: &ActuatorCfg) -> Result<Self, SorterError> {
        if stepper.has_enable() {
            stepper
                .set_enabled(false)
                .map_err(|e| SorterError::HardwareInit(format!("stepper enable line: {}", hw_message(&*e))))?;
        }
        stepper
            .set_step(false)
            .map_err(|e| SorterError::HardwareInit(format!("stepper step line: {}", hw_message(&*e))))?;
        debug!(
            step_delay_us = u64::try_from(cfg.step_delay.as_micros()).unwrap_or(u64::MAX),
            ramp = cfg.ramp.is_some(),
            has_enable = stepper.has_enable(),
            "actuator initialized"
        );
        Ok(Self {
            stepper,
            clock,
            profile: profile_for(cfg),
            settle: cfg.settle,
            disable_after_move: cfg.disable_after_move,
            position: 0,
            enabled: false,
            released: false,
        })
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Drive to absolute position `target`, blocking until done.
    ///
    /// On a driver error the move stops, the driver is disabled, and the
    /// error carries the position actually reached.
    pub fn move_to(&mut self, target: i64) -> Result<MoveReport, SorterError> {
        if self.released {
            return Err(SorterError::State("actuator already shut down".into()));
        }
        let from = self.position;
        let delta = target.checked_sub(from).ok_or_else(|| {
            SorterError::State(format!("move from {from} to {target} overflows the step counter"))
        })?;
        let Some(dir) = Direction::of_delta(delta) else {
            return Ok(MoveReport { from, to: from, pulses: 0 });
        };

        if self.stepper.has_enable() && !self.enabled {
            self.stepper.set_enabled(true).map_err(|e| self.fault(&e))?;
            self.enabled = true;
            self.clock.sleep(self.settle);
        }
        self.stepper.set_direction(dir).map_err(|e| self.fault(&e))?;
        self.clock.sleep(self.settle);

        let n = delta.unsigned_abs();
        for i in 0..n {
            let half = self.profile.half_period(i, n);
            self.stepper.set_step(true).map_err(|e| self.fault(&e))?;
            self.clock.sleep(half);
            self.stepper.set_step(false).map_err(|e| self.fault(&e))?;
            self.clock.sleep(half);
            self.position += dir.unit();
        }

        if self.disable_after_move {
            self.disable();
        }
        debug!(from, to = self.position, pulses = n, "move complete");
        Ok(MoveReport { from, to: self.position, pulses: n })
    }

    /// Disable the driver and release the lines. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        if self.released {
            return;
        }
        self.disable();
        if let Err(e) = self.stepper.release() {
            warn!(error = %hw_message(&*e), "stepper release failed");
        }
        self.released = true;
        info!(position = self.position, "actuator released");
    }

    fn disable(&mut self) {
        if !self.stepper.has_enable() {
            return;
        }
        match self.stepper.set_enabled(false) {
            Ok(()) => self.enabled = false,
            Err(e) => warn!(error = %hw_message(&*e), "stepper disable failed"),
        }
    }

    fn fault(&mut self, e: &BoxError) -> SorterError {
        let message = hw_message(&**e);
        warn!(reached = self.position, error = %message, "actuator fault; disabling driver");
        let _ = self.stepper.set_step(false);
        self.disable();
        SorterError::ActuatorFault {
            reached: self.position,
            message,
        }
    }
}

impl<S: Stepper, C: Clock> Drop for Actuator<S, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
