//! Component health and the overall system status derived from it.
use serde::Serialize;
use std::collections::BTreeMap;

/// Overall status shown to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Starting,
    Active,
    Inactive,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Capture,
    Actuator,
    Sensors,
}

impl Component {
    pub fn name(self) -> &'static str {
        match self {
            Component::Capture => "capture",
            Component::Actuator => "actuator",
            Component::Sensors => "sensors",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum Health {
    Ok,
    Error(String),
}

impl Health {
    pub fn is_ok(&self) -> bool {
        matches!(self, Health::Ok)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Starting,
    Running,
    Stopped,
}

/// Per-component health plus the lifecycle phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusBoard {
    pub lifecycle: Lifecycle,
    pub components: BTreeMap<Component, Health>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self {
            lifecycle: Lifecycle::Starting,
            components: [Component::Capture, Component::Actuator, Component::Sensors]
                .into_iter()
                .map(|c| (c, Health::Ok))
                .collect(),
        }
    }
}

impl StatusBoard {
    /// Returns true if the stored value changed.
    pub fn set(&mut self, component: Component, health: Health) -> bool {
        self.components.insert(component, health.clone()) != Some(health)
    }

    /// Derive the overall status and its human-readable message.
    ///
    /// A stopped system is inactive whatever its components say; otherwise
    /// the first failing component wins.
    pub fn status(&self) -> (SystemStatus, String) {
        if self.lifecycle == Lifecycle::Stopped {
            return (SystemStatus::Inactive, "stopped".into());
        }
        if let Some((c, Health::Error(msg))) =
            self.components.iter().find(|(_, h)| !h.is_ok())
        {
            return (SystemStatus::Error, format!("{}: {msg}", c.name()));
        }
        match self.lifecycle {
            Lifecycle::Starting => (SystemStatus::Starting, "starting".into()),
            _ => (SystemStatus::Active, "running".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_component_dominates_until_stopped() {
        let mut b = StatusBoard::default();
        assert_eq!(b.status().0, SystemStatus::Starting);
        b.lifecycle = Lifecycle::Running;
        assert_eq!(b.status().0, SystemStatus::Active);
        assert!(b.set(Component::Capture, Health::Error("camera unavailable".into())));
        assert!(!b.set(Component::Capture, Health::Error("camera unavailable".into())));
        let (s, msg) = b.status();
        assert_eq!(s, SystemStatus::Error);
        assert!(msg.contains("camera unavailable"), "{msg}");
        b.lifecycle = Lifecycle::Stopped;
        assert_eq!(b.status().0, SystemStatus::Inactive);
    }
}
