//! Raspberry Pi GPIO devices: A4988-style step/dir stepper and HC-SR04 sensors.
use std::time::Duration;

use rppal::gpio::{Gpio, InputPin, OutputPin};
use sorter_traits::{BoxError, Direction, EchoSensor, Stepper};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::util::measure_high_pulse;

fn open_gpio() -> Result<Gpio> {
    Gpio::new().map_err(|e| HwError::Gpio(format!("open gpio: {e}")))
}

fn output(gpio: &Gpio, pin: u8) -> Result<OutputPin> {
    gpio.get(pin)
        .map(|p| p.into_output_low())
        .map_err(|e| HwError::Gpio(format!("claim pin {pin}: {e}")))
}

fn input(gpio: &Gpio, pin: u8) -> Result<InputPin> {
    gpio.get(pin)
        .map(|p| p.into_input())
        .map_err(|e| HwError::Gpio(format!("claim pin {pin}: {e}")))
}

pub struct GpioStepper {
    step: OutputPin,
    dir: OutputPin,
    // Active low: driving the line high disables the stage.
    enable: Option<OutputPin>,
    invert_direction: bool,
}

impl GpioStepper {
    /// Claim the stepper pins. The stage starts de-energized.
    pub fn claim(step_pin: u8, dir_pin: u8, enable_pin: Option<u8>, invert_direction: bool) -> Result<Self> {
        let gpio = open_gpio()?;
        let step = output(&gpio, step_pin)?;
        let dir = output(&gpio, dir_pin)?;
        let enable = match enable_pin {
            Some(pin) => {
                let mut en = output(&gpio, pin)?;
                en.set_high();
                Some(en)
            }
            None => None,
        };
        debug!(step_pin, dir_pin, ?enable_pin, "stepper pins claimed");
        Ok(Self {
            step,
            dir,
            enable,
            invert_direction,
        })
    }
}

impl Stepper for GpioStepper {
    fn set_direction(&mut self, dir: Direction) -> std::result::Result<(), BoxError> {
        let forward = (dir == Direction::Forward) != self.invert_direction;
        if forward {
            self.dir.set_high();
        } else {
            self.dir.set_low();
        }
        Ok(())
    }

    fn set_step(&mut self, high: bool) -> std::result::Result<(), BoxError> {
        if high {
            self.step.set_high();
        } else {
            self.step.set_low();
        }
        Ok(())
    }

    fn set_enabled(&mut self, on: bool) -> std::result::Result<(), BoxError> {
        if let Some(en) = self.enable.as_mut() {
            if on {
                en.set_low();
            } else {
                en.set_high();
            }
        }
        Ok(())
    }

    fn has_enable(&self) -> bool {
        self.enable.is_some()
    }

    fn release(&mut self) -> std::result::Result<(), BoxError> {
        if let Some(en) = self.enable.as_mut() {
            en.set_high();
        }
        self.step.set_low();
        self.dir.set_low();
        // rppal restores the pins' original mode when they drop.
        Ok(())
    }
}

/// HC-SR04 ultrasonic sensor on a trigger/echo pin pair.
pub struct HcSr04 {
    trig: OutputPin,
    echo: InputPin,
}

impl HcSr04 {
    pub fn claim(trig_pin: u8, echo_pin: u8) -> Result<Self> {
        let gpio = open_gpio()?;
        let trig = output(&gpio, trig_pin)?;
        let echo = input(&gpio, echo_pin)?;
        debug!(trig_pin, echo_pin, "hc-sr04 pins claimed");
        Ok(Self { trig, echo })
    }
}

impl EchoSensor for HcSr04 {
    fn ping(&mut self, timeout: Duration) -> std::result::Result<Duration, BoxError> {
        self.trig.set_low();
        std::thread::sleep(Duration::from_micros(20));
        // 10 µs trigger pulse
        self.trig.set_high();
        std::thread::sleep(Duration::from_micros(10));
        self.trig.set_low();

        let echo = &self.echo;
        let width = measure_high_pulse(|| echo.is_high(), timeout, Duration::ZERO)?;
        trace!(echo_us = u64::try_from(width.as_micros()).unwrap_or(u64::MAX), "hc-sr04 echo");
        Ok(width)
    }
}
