//! Configuration Module
//!
//! Provides TOML-based configuration for Beacon-Hunter.
//! Configuration is optional - CLI arguments can override file settings.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::export::OutputFormat;
use crate::scorer::ScoringPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub detection: DetectionConfig,
    pub paths: PathsConfig,
    pub feed: FeedConfig,
    pub output: OutputConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads configuration from file if it exists, otherwise returns defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(p).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.min_gaps == 0 {
            anyhow::bail!("min_gaps must be greater than 0");
        }
        if !(d.jitter_tolerance_secs >= 0.0) {
            anyhow::bail!("jitter_tolerance_secs must not be negative");
        }
        if !(d.beacon_threshold_percent > 0.0 && d.beacon_threshold_percent <= 100.0) {
            anyhow::bail!("beacon_threshold_percent must be in (0, 100]");
        }
        if !(d.fast_beacon_cutoff_secs >= 0.0) {
            anyhow::bail!("fast_beacon_cutoff_secs must not be negative");
        }
        if !(d.fast_beacon_multiplier >= 1.0) {
            anyhow::bail!("fast_beacon_multiplier must be at least 1.0");
        }
        if self.feed.timeout_secs == 0 {
            anyhow::bail!("feed timeout_secs must be greater than 0");
        }
        Ok(())
    }
}

/// Detection thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum inter-arrival gaps before a session can be judged
    pub min_gaps: usize,
    /// Allowed deviation from the dominant gap, in seconds
    pub jitter_tolerance_secs: f64,
    /// Consistency percentage at or above which a session is beaconing
    pub beacon_threshold_percent: f64,
    /// Weighted scoring: gaps below this are boosted
    pub fast_beacon_cutoff_secs: f64,
    /// Weighted scoring: boost factor for fast beacons
    pub fast_beacon_multiplier: f64,
    /// Anomaly scoring formula
    pub scoring: ScoringPolicy,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_gaps: 3,
            jitter_tolerance_secs: 10.0,
            beacon_threshold_percent: 80.0,
            fast_beacon_cutoff_secs: 5.0,
            fast_beacon_multiplier: 15.0,
            scoring: ScoringPolicy::Ratio,
        }
    }
}

/// File-system locations
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory scanned for *.csv connection logs
    pub input_dir: String,
    /// Directory reports are written to
    pub output_dir: String,
    /// Newline-delimited known C2 indicator list
    pub indicator_list: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: "CSVs".to_string(),
            output_dir: "OUTPUT".to_string(),
            indicator_list: "known_c2_list.txt".to_string(),
        }
    }
}

/// Threat feed settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Full ThreatFox JSON export (zip)
    pub url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://threatfox.abuse.ch/export/json/full/".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Stdout format (text, json, jsonl)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Write JSON and HTML report files to the output directory
    pub write_reports: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Text,
            write_reports: true,
        }
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(
        format: &OutputFormat,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
