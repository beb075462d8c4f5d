//! Maps `Box<dyn Error>` from trait boundaries to typed `SorterError`.
//!
//! The traits in `sorter_traits` use `Box<dyn Error + Send + Sync>`; this
//! module converts those to our typed error enum, with an optional
//! feature-gated path for `sorter_hardware::HwError` downcasting.

use crate::error::SorterError;

/// Map a trait-boundary error to a typed `SorterError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> SorterError {
    #[cfg(feature = "hardware-errors")]
    {
        use sorter_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::EchoTimeout | HwError::EchoTooLong(_) => {
                    SorterError::SensorRead(hw.to_string())
                }
                HwError::Camera(_) | HwError::NoFrame => SorterError::Capture(hw.to_string()),
                other => SorterError::Hardware(other.to_string()),
            };
        }
    }

    // Fallback: string-based detection
    let s = e.to_string();
    let lower = s.to_lowercase();
    if lower.contains("timeout") || lower.contains("echo") {
        SorterError::SensorRead(s)
    } else if lower.contains("camera") || lower.contains("frame") {
        SorterError::Capture(s)
    } else {
        SorterError::Hardware(s)
    }
}

/// Message text of a trait-boundary error after mapping.
pub(crate) fn hw_message(e: &(dyn std::error::Error + 'static)) -> String {
    match map_hw_error(e) {
        SorterError::SensorRead(m)
        | SorterError::Capture(m)
        | SorterError::Hardware(m)
        | SorterError::HardwareInit(m)
        | SorterError::Config(m)
        | SorterError::State(m) => m,
        SorterError::ActuatorFault { message, .. } => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_fallback_classifies_by_keyword() {
        let e = std::io::Error::other("echo line stuck");
        assert!(matches!(map_hw_error(&e), SorterError::SensorRead(_)));
        let e = std::io::Error::other("camera gone");
        assert!(matches!(map_hw_error(&e), SorterError::Capture(_)));
        let e = std::io::Error::other("pin busy");
        assert_eq!(map_hw_error(&e), SorterError::Hardware("pin busy".into()));
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn downcasts_hw_errors() {
        use sorter_hardware::error::HwError;
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::EchoTimeout);
        assert!(matches!(map_hw_error(&*boxed), SorterError::SensorRead(_)));
        let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(HwError::StepperFault(3));
        assert_eq!(hw_message(&*boxed), "stepper fault after 3 pulses");
    }
}
