//! Plain data passed between the capture loop, the sort sequence, the fill
//! monitor and the state publisher.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::util::now_unix_ms;

/// One accepted classification result, stamped when it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionEvent {
    pub label: String,
    pub confidence: f32,
    pub timestamp_ms: u64,
}

impl DetectionEvent {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
            timestamp_ms: now_unix_ms(),
        }
    }
}

/// Smoothed fill level of one bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FillLevelReading {
    pub bin: String,
    /// Percentage full, in [0, 100], rounded to 0.1.
    pub percentage: f32,
    /// Smoothed distance from the sensor to the top of the contents.
    pub distance_cm: f32,
    pub sampled_at_ms: u64,
}

/// Items sorted per label since start (or since the last reset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub by_label: BTreeMap<String, u64>,
    pub total: u64,
}

impl Counters {
    /// Counters with every configured label present at zero.
    pub fn with_labels<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        Self {
            by_label: labels.into_iter().map(|l| (l.into(), 0)).collect(),
            total: 0,
        }
    }

    pub fn record(&mut self, label: &str) {
        *self.by_label.entry(label.to_string()).or_insert(0) += 1;
        self.total += 1;
    }

    /// Zero every count, keeping the label keys.
    pub fn reset(&mut self) {
        self.by_label.values_mut().for_each(|v| *v = 0);
        self.total = 0;
    }

    pub fn get(&self, label: &str) -> u64 {
        self.by_label.get(label).copied().unwrap_or(0)
    }
}
