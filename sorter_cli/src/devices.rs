//! Device assembly: GPIO and V4L2 devices when built in, simulated otherwise.
use sorter_config::Config;
use sorter_core::{BoxedEchoSensor, SorterError};
use sorter_traits::{Classifier, FrameSource, Stepper};
use tracing::{info, warn};

pub type DynStepper = Box<dyn Stepper + Send>;
pub type DynCamera = Box<dyn FrameSource + Send>;
pub type DynClassifier = Box<dyn Classifier + Send>;

pub fn stepper(cfg: &Config) -> Result<DynStepper, SorterError> {
    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        let s = sorter_hardware::GpioStepper::claim(
            cfg.pins.step,
            cfg.pins.dir,
            cfg.pins.enable,
            cfg.motor.invert_direction,
        )
        .map_err(|e| SorterError::HardwareInit(format!("open stepper pins: {e}")))?;
        Ok(Box::new(s))
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        info!("using simulated stepper");
        let s = sorter_hardware::SimulatedStepper::new();
        Ok(if cfg.pins.enable.is_some() {
            Box::new(s.with_enable())
        } else {
            Box::new(s)
        })
    }
}

pub fn sensors(cfg: &Config) -> Result<Vec<(String, BoxedEchoSensor)>, SorterError> {
    let mut out: Vec<(String, BoxedEchoSensor)> = Vec::with_capacity(cfg.sensors.bins.len());
    for bin in &cfg.sensors.bins {
        #[cfg(all(feature = "hardware", target_os = "linux"))]
        let sensor: BoxedEchoSensor = Box::new(
            sorter_hardware::HcSr04::claim(bin.trig, bin.echo).map_err(|e| {
                SorterError::HardwareInit(format!("open sensor pins for {}: {e}", bin.name))
            })?,
        );
        #[cfg(not(all(feature = "hardware", target_os = "linux")))]
        let sensor: BoxedEchoSensor = {
            // Each simulated bin starts nearly empty and fills slowly.
            let depth = cfg.sensors.bin_depth_cm;
            Box::new(sorter_hardware::SimulatedEchoSensor::filling(depth * 0.9, depth / 2000.0))
        };
        out.push((bin.name.clone(), sensor));
    }
    Ok(out)
}

pub fn camera(cfg: &Config) -> Result<DynCamera, SorterError> {
    let (width, height) = cfg.capture.resolution;
    #[cfg(all(feature = "camera", target_os = "linux"))]
    {
        let cam = sorter_hardware::V4l2Camera::open(cfg.capture.camera_index, width, height, cfg.capture.fps)
            .map_err(|e| SorterError::HardwareInit(format!("open camera: {e}")))?;
        Ok(Box::new(cam))
    }
    #[cfg(not(all(feature = "camera", target_os = "linux")))]
    {
        info!("using simulated camera");
        let delay = sorter_core::util::period(cfg.capture.fps);
        Ok(Box::new(
            sorter_hardware::SimulatedCamera::new(width, height).with_frame_delay(delay),
        ))
    }
}

/// The built-in classifier cycles through the configured labels, one
/// detection per second of frames. Model-backed classifiers plug in through
/// the `Classifier` trait.
pub fn classifier(cfg: &Config) -> DynClassifier {
    if let Some(model) = &cfg.classifier.model {
        warn!(%model, "model inference is not built in; using the scripted classifier");
    }
    let every = usize::try_from(cfg.capture.fps.max(1)).unwrap_or(1);
    Box::new(sorter_hardware::ScriptedClassifier::round_robin(
        &cfg.classifier.labels,
        every,
        0.9,
    ))
}

/// Runs on the sort worker thread before its first move.
pub fn worker_init(rt_priority: Option<i32>) -> impl FnOnce() + Send + 'static {
    move || {
        let Some(prio) = rt_priority else {
            return;
        };
        match sorter_hardware::promote_current_thread(prio) {
            Ok(applied) => info!(priority = applied, "sort worker running SCHED_FIFO"),
            Err(e) => warn!(error = %e, "real-time promotion failed; continuing at normal priority"),
        }
    }
}
