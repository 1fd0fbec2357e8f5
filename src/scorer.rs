//! Anomaly scoring for classified sessions.
//!
//! Two formulas exist and are kept as named policies:
//!
//! - **ratio**: `consistency% / dominant_gap`, rounded to 2 decimals,
//!   0 when the gap is 0.
//! - **weighted**: `dominant_gap * consistency% / 100`, multiplied by 15
//!   for gaps under 5s, then rounded up.
//!
//! They do not agree on which sessions are worst (weighted grows with
//! the gap outside the fast-beacon band), so the policy is a detection
//! parameter chosen in configuration.

use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;

/// Scoring formula selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringPolicy {
    #[default]
    Ratio,
    Weighted,
}

impl std::str::FromStr for ScoringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ratio" => Ok(Self::Ratio),
            "weighted" => Ok(Self::Weighted),
            _ => Err(format!("Unknown scoring policy: {}", s)),
        }
    }
}

impl std::fmt::Display for ScoringPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ratio => write!(f, "ratio"),
            Self::Weighted => write!(f, "weighted"),
        }
    }
}

/// Trait for anomaly scoring strategies.
pub trait Scorer: Send + Sync {
    /// Non-negative score, higher is more suspicious.
    fn score(&self, dominant_gap: f64, consistency_percent: f64) -> f64;

    fn policy(&self) -> ScoringPolicy;
}

/// Frequent and regular: consistency divided by interval.
#[derive(Debug, Clone, Default)]
pub struct RatioScorer;

impl Scorer for RatioScorer {
    fn score(&self, dominant_gap: f64, consistency_percent: f64) -> f64 {
        if dominant_gap > 0.0 {
            round_to(consistency_percent / dominant_gap, 2)
        } else {
            0.0
        }
    }

    fn policy(&self) -> ScoringPolicy {
        ScoringPolicy::Ratio
    }
}

/// Interval weighted by consistency, boosted for sub-cutoff intervals.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    fast_cutoff_secs: f64,
    fast_multiplier: f64,
}

impl WeightedScorer {
    pub fn new(fast_cutoff_secs: f64, fast_multiplier: f64) -> Self {
        Self {
            fast_cutoff_secs,
            fast_multiplier,
        }
    }
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self::new(5.0, 15.0)
    }
}

impl Scorer for WeightedScorer {
    fn score(&self, dominant_gap: f64, consistency_percent: f64) -> f64 {
        let base = dominant_gap * consistency_percent / 100.0;
        if dominant_gap < self.fast_cutoff_secs {
            (base * self.fast_multiplier).ceil()
        } else {
            base.ceil()
        }
    }

    fn policy(&self) -> ScoringPolicy {
        ScoringPolicy::Weighted
    }
}

/// Builds the scorer selected in configuration.
pub fn scorer_from_config(config: &DetectionConfig) -> Box<dyn Scorer> {
    match config.scoring {
        ScoringPolicy::Ratio => Box::new(RatioScorer),
        ScoringPolicy::Weighted => Box::new(WeightedScorer::new(
            config.fast_beacon_cutoff_secs,
            config.fast_beacon_multiplier,
        )),
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_score() {
        assert!((RatioScorer.score(60.0, 90.0) - 1.5).abs() < f64::EPSILON);
        assert_eq!(RatioScorer.score(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_ratio_rounding() {
        // 100 / 3 = 33.333..
        assert_eq!(RatioScorer.score(3.0, 100.0), 33.33);
    }

    #[test]
    fn test_weighted_score() {
        let scorer = WeightedScorer::default();

        // 60 * 0.9 = 54
        assert_eq!(scorer.score(60.0, 90.0), 54.0);
        // 2 * 0.85 = 1.7, * 15 = 25.5 -> 26
        assert_eq!(scorer.score(2.0, 85.0), 26.0);
        // exactly at the cutoff is not boosted
        assert_eq!(scorer.score(5.0, 100.0), 5.0);
    }

    #[test]
    fn test_monotonic_in_consistency() {
        let scorers: Vec<Box<dyn Scorer>> =
            vec![Box::new(RatioScorer), Box::new(WeightedScorer::default())];

        for scorer in &scorers {
            for gap in [0.0, 1.0, 4.5, 5.0, 30.0, 60.0, 3600.0] {
                let mut previous = scorer.score(gap, 0.0);
                for step in 1..=1000 {
                    let consistency = step as f64 / 10.0;
                    let current = scorer.score(gap, consistency);
                    assert!(
                        current >= previous,
                        "{} score decreased at gap={} consistency={}",
                        scorer.policy(),
                        gap,
                        consistency
                    );
                    assert!(current >= 0.0);
                    previous = current;
                }
            }
        }
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("ratio".parse::<ScoringPolicy>().unwrap(), ScoringPolicy::Ratio);
        assert_eq!(
            "Weighted".parse::<ScoringPolicy>().unwrap(),
            ScoringPolicy::Weighted
        );
        assert!("median".parse::<ScoringPolicy>().is_err());
    }

    #[test]
    fn test_scorer_from_config() {
        let mut config = DetectionConfig::default();
        assert_eq!(scorer_from_config(&config).policy(), ScoringPolicy::Ratio);

        config.scoring = ScoringPolicy::Weighted;
        assert_eq!(scorer_from_config(&config).policy(), ScoringPolicy::Weighted);
    }
}
