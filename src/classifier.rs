//! Session classification against the beaconing threshold.

use serde::{Deserialize, Serialize};

use crate::analyzer::IntervalStatistics;
use crate::config::DetectionConfig;

/// Terminal classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetectionStatus {
    /// Fewer gaps than the minimum; no periodicity judgment possible
    InsufficientData,
    /// Consistency at or above the threshold
    BeaconingDetected,
    /// Enough data, but no dominant interval
    NotDetected,
}

impl DetectionStatus {
    /// Returns a human-readable severity level.
    pub fn severity(&self) -> &'static str {
        match self {
            Self::BeaconingDetected => "HIGH",
            Self::NotDetected => "LOW",
            Self::InsufficientData => "UNKNOWN",
        }
    }

    /// Whether a beaconing judgment was reached.
    pub fn is_beaconing(&self) -> bool {
        matches!(self, Self::BeaconingDetected)
    }
}

impl std::fmt::Display for DetectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientData => write!(f, "NOT ENOUGH DATA"),
            Self::BeaconingDetected => write!(f, "BEACONING DETECTED"),
            Self::NotDetected => write!(f, "NOT DETECTED"),
        }
    }
}

/// Applies the consistency threshold to interval statistics.
#[derive(Debug, Clone)]
pub struct Classifier {
    threshold_percent: f64,
}

impl Classifier {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.beacon_threshold_percent)
    }

    /// `None` statistics means the analyzer found too few gaps.
    pub fn classify(&self, stats: Option<&IntervalStatistics>) -> DetectionStatus {
        match stats {
            None => DetectionStatus::InsufficientData,
            Some(s) if s.consistency_percent >= self.threshold_percent => {
                DetectionStatus::BeaconingDetected
            }
            Some(_) => DetectionStatus::NotDetected,
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}
