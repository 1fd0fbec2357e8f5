//! Interval analysis - turns a session's timestamps into periodicity metrics.
//!
//! # Statistical Methodology
//!
//! ## Gap Calculation
//! For a series of timestamps [t₀, t₁, t₂, ..., tₙ], we calculate the gaps:
//! Δᵢ = tᵢ - tᵢ₋₁ for i ∈ [1, n], in seconds.
//!
//! ## Dominant Gap
//! The exact-value mode of the gaps. Among equally frequent values the one
//! encountered first (lowest index) wins.
//!
//! ## Consistency
//! A gap is consistent when |Δᵢ - dominant| ≤ jitter tolerance (10s default).
//! consistency% = 100 · consistent / n
//!
//! Exact-value mode fragments intervals that never repeat to the
//! sub-second, e.g. 60.01 / 59.98 / 60.03 each count once. Bucketing
//! gaps before taking the mode would avoid that but changes results.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use tracing::trace;

use crate::config::DetectionConfig;

/// Periodicity metrics for one session. Recomputed per run, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalStatistics {
    /// Consecutive timestamp differences in seconds, in session order.
    pub gaps: Vec<f64>,
    /// Most frequent exact gap value.
    pub dominant_gap: f64,
    /// Gaps within the jitter tolerance of `dominant_gap`.
    pub consistent_count: usize,
    /// `100 * consistent_count / gaps.len()`, in [0, 100].
    pub consistency_percent: f64,
}

/// Converts ascending timestamps to gaps in seconds.
pub fn timestamps_to_gaps(timestamps: &[NaiveDateTime]) -> Vec<f64> {
    if timestamps.len() < 2 {
        return Vec::new();
    }

    timestamps
        .windows(2)
        .map(|window| {
            let delta = window[1].signed_duration_since(window[0]);
            match delta.num_microseconds() {
                Some(us) => us as f64 / 1_000_000.0,
                None => delta.num_seconds() as f64,
            }
        })
        .collect()
}

/// Most frequent exact value; ties go to the first value encountered.
pub fn dominant_gap(gaps: &[f64]) -> Option<f64> {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for gap in gaps {
        *counts.entry(normalize_bits(*gap)).or_insert(0) += 1;
    }

    let mut best: Option<(f64, usize)> = None;
    for gap in gaps {
        let count = counts[&normalize_bits(*gap)];
        match best {
            Some((_, best_count)) if count <= best_count => {}
            _ => best = Some((*gap, count)),
        }
    }

    best.map(|(gap, _)| gap)
}

// -0.0 and 0.0 are the same gap.
fn normalize_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

/// Computes interval statistics for sessions with enough samples.
#[derive(Debug, Clone)]
pub struct IntervalAnalyzer {
    min_gaps: usize,
    jitter_tolerance_secs: f64,
}

impl IntervalAnalyzer {
    pub fn new(min_gaps: usize, jitter_tolerance_secs: f64) -> Self {
        Self {
            min_gaps,
            jitter_tolerance_secs,
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.min_gaps, config.jitter_tolerance_secs)
    }

    /// Returns `None` when there are fewer than `min_gaps` gaps; the caller
    /// treats that as insufficient data.
    pub fn analyze(&self, gaps: Vec<f64>) -> Option<IntervalStatistics> {
        if gaps.len() < self.min_gaps || gaps.is_empty() {
            trace!("Insufficient gaps: {} < {}", gaps.len(), self.min_gaps);
            return None;
        }

        let dominant = dominant_gap(&gaps)?;
        let consistent_count = gaps
            .iter()
            .filter(|gap| (*gap - dominant).abs() <= self.jitter_tolerance_secs)
            .count();
        let consistency_percent = 100.0 * consistent_count as f64 / gaps.len() as f64;

        Some(IntervalStatistics {
            gaps,
            dominant_gap: dominant,
            consistent_count,
            consistency_percent,
        })
    }

    /// Convenience wrapper over [`timestamps_to_gaps`] and [`Self::analyze`].
    pub fn analyze_timestamps(&self, timestamps: &[NaiveDateTime]) -> Option<IntervalStatistics> {
        self.analyze(timestamps_to_gaps(timestamps))
    }
}

impl Default for IntervalAnalyzer {
    fn default() -> Self {
        Self::from_config(&DetectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_timestamps_to_gaps() {
        let t0 = base();
        let timestamps = vec![
            t0,
            t0 + chrono::Duration::seconds(60),
            t0 + chrono::Duration::seconds(120),
            t0 + chrono::Duration::milliseconds(180_500),
        ];

        let gaps = timestamps_to_gaps(&timestamps);

        assert_eq!(gaps, vec![60.0, 60.0, 60.5]);
    }

    #[test]
    fn test_timestamps_to_gaps_empty() {
        assert!(timestamps_to_gaps(&[]).is_empty());
        assert!(timestamps_to_gaps(&[base()]).is_empty());
    }

    #[test]
    fn test_mixed_gaps_consistency() {
        let analyzer = IntervalAnalyzer::default();
        let stats = analyzer.analyze(vec![60.0, 60.0, 60.0, 180.0]).unwrap();

        assert_eq!(stats.dominant_gap, 60.0);
        assert_eq!(stats.consistent_count, 3);
        assert!((stats.consistency_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_insufficient_gaps() {
        let analyzer = IntervalAnalyzer::default();

        assert!(analyzer.analyze(vec![]).is_none());
        assert!(analyzer.analyze(vec![60.0, 60.0]).is_none());
        assert!(analyzer.analyze(vec![60.0, 60.0, 60.0]).is_some());
    }

    #[test]
    fn test_dominant_gap_tie_breaks_on_first_seen() {
        assert_eq!(dominant_gap(&[30.0, 90.0, 90.0, 30.0]), Some(30.0));
        assert_eq!(dominant_gap(&[90.0, 30.0, 30.0, 90.0]), Some(90.0));
        assert_eq!(dominant_gap(&[5.0, 7.0, 7.0]), Some(7.0));
        assert_eq!(dominant_gap(&[]), None);
    }

    #[test]
    fn test_jitter_tolerance_boundary() {
        let analyzer = IntervalAnalyzer::new(3, 10.0);
        let stats = analyzer.analyze(vec![60.0, 60.0, 70.0, 50.0, 70.5]).unwrap();

        // 70 and 50 are exactly on the boundary, 70.5 is outside
        assert_eq!(stats.consistent_count, 4);
        assert!((stats.consistency_percent - 80.0).abs() < 1e-9);
    }

    #[test]
    fn test_sub_second_noise_fragments_mode() {
        let analyzer = IntervalAnalyzer::new(3, 0.0);
        let stats = analyzer.analyze(vec![60.01, 59.98, 60.03, 59.99]).unwrap();

        // Every value is unique, so the first one wins with a single hit
        assert_eq!(stats.dominant_gap, 60.01);
        assert_eq!(stats.consistent_count, 1);
    }

    #[test]
    fn test_real_world_beacon_pattern() {
        // 60-second beacon with ±3s deterministic jitter
        let t0 = base();
        let mut offset = 0i64;
        let timestamps: Vec<NaiveDateTime> = (0..21)
            .map(|i| {
                if i > 0 {
                    offset += 60 + (i % 3) - 1;
                }
                t0 + chrono::Duration::seconds(offset)
            })
            .collect();

        let stats = IntervalAnalyzer::default()
            .analyze_timestamps(&timestamps)
            .unwrap();

        assert_eq!(stats.gaps.len(), 20);
        assert!((stats.consistency_percent - 100.0).abs() < f64::EPSILON);
    }
}
