//! Human-readable error descriptions and structured JSON error formatting.

use sorter_core::SorterError;

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    if let Some(se) = err.downcast_ref::<SorterError>() {
        return match se {
            SorterError::Config(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing sections, a classifier label without a bin position, or out-of-range values in the TOML.\nHow to fix: Edit the config file (see etc/sorter.toml), then rerun."
            ),
            SorterError::HardwareInit(msg) => format!(
                "What happened: A device could not be initialized ({msg}).\nLikely causes: Wrong pin numbers, missing GPIO permissions, or the camera is not connected.\nHow to fix: Check [pins] and [[sensors.bins]] in the config, verify wiring and that the process may access /dev/gpiomem and /dev/video*."
            ),
            SorterError::ActuatorFault { reached, message } => format!(
                "What happened: The stepper stopped mid-move at position {reached} ({message}).\nLikely causes: Driver fault, loose STEP/DIR wiring, or a jammed carriage.\nHow to fix: Clear the mechanism, power-cycle the driver, then `sorter jog --to 0` to re-home."
            ),
            SorterError::SensorRead(msg) => format!(
                "What happened: Ultrasonic sensor read failed ({msg}).\nLikely causes: TRIG/ECHO swapped or unwired, object out of range, or read_timeout_ms too low.\nHow to fix: Check [[sensors.bins]] pins and wiring; consider raising sensors.read_timeout_ms."
            ),
            SorterError::Capture(msg) => format!(
                "What happened: Camera capture failed ({msg}).\nLikely causes: Camera unplugged or busy in another process.\nHow to fix: Reconnect the camera and check capture.camera_index."
            ),
            other => format!(
                "What happened: {other}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // Generic fallback
    let msg = err.to_string();
    let mut cause = String::new();
    if let Some(src) = err.chain().nth(1) {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable process exit codes: config 2, hardware init 3, anything else 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    match err.downcast_ref::<SorterError>() {
        Some(SorterError::Config(_)) => 2,
        Some(SorterError::HardwareInit(_)) => 3,
        _ => 1,
    }
}

pub fn reason_name(err: &eyre::Report) -> &'static str {
    match err.downcast_ref::<SorterError>() {
        Some(SorterError::Config(_)) => "Config",
        Some(SorterError::HardwareInit(_)) => "HardwareInit",
        Some(SorterError::ActuatorFault { .. }) => "ActuatorFault",
        Some(SorterError::SensorRead(_)) => "SensorRead",
        Some(SorterError::Capture(_)) => "Capture",
        Some(SorterError::Hardware(_)) => "Hardware",
        Some(SorterError::State(_)) => "State",
        None => "Error",
    }
}

/// Structured JSON for errors when --json is enabled.
pub fn format_error_json(err: &eyre::Report) -> String {
    use serde_json::json;

    let mut obj = json!({ "reason": reason_name(err), "message": humanize(err) });
    if let Some(SorterError::ActuatorFault { reached, .. }) = err.downcast_ref::<SorterError>() {
        obj["details"] = json!({ "reached": reached });
    }
    obj.to_string()
}
