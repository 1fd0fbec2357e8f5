//! Beaconing detection engine.
//!
//! ```text
//! records ──> group_sessions ──> per session:
//!                                  timestamps_to_gaps ─> IntervalAnalyzer
//!                                  Classifier ─> Scorer
//!                                  indicator matching
//!                              ──> DetectionOutcome { results, indicator_contacts }
//! ```
//!
//! The engine performs no I/O and reads no clock, so identical input always
//! produces identical output.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info};

use crate::analyzer::IntervalAnalyzer;
use crate::classifier::{Classifier, DetectionStatus};
use crate::config::DetectionConfig;
use crate::error::DetectionError;
use crate::indicators::IndicatorSet;
use crate::record::FlowRecord;
use crate::scorer::{scorer_from_config, Scorer, ScoringPolicy};
use crate::session::{group_sessions, Session};

/// Per-source detection verdict.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
    pub source_address: String,
    pub total_events: usize,
    pub status: DetectionStatus,
    pub destinations: BTreeSet<String>,
    pub asset: Option<String>,
    pub user: Option<String>,
    pub dominant_gap: Option<f64>,
    pub consistency_percent: Option<f64>,
    pub anomaly_score: Option<f64>,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub matched_indicators: BTreeSet<String>,
    pub is_known_indicator: bool,
}

/// A source contacted a known C2 destination without beaconing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorContactEvent {
    pub source_address: String,
    pub destination_address: String,
    pub timestamps: Vec<NaiveDateTime>,
}

impl IndicatorContactEvent {
    pub fn first_contact(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }
}

/// Everything one detection run produced, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionOutcome {
    pub results: Vec<DetectionResult>,
    pub indicator_contacts: Vec<IndicatorContactEvent>,
}

impl DetectionOutcome {
    /// Results classified as beaconing.
    pub fn beaconing(&self) -> impl Iterator<Item = &DetectionResult> {
        self.results.iter().filter(|r| r.status.is_beaconing())
    }

    pub fn count_by_status(&self, status: DetectionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    fn push(&mut self, result: DetectionResult, contacts: Vec<IndicatorContactEvent>) {
        self.results.push(result);
        self.indicator_contacts.extend(contacts);
    }
}

/// Runs the per-session pipeline over a batch of records.
pub struct BeaconDetector<'a> {
    analyzer: IntervalAnalyzer,
    classifier: Classifier,
    scorer: Box<dyn Scorer>,
    indicators: &'a IndicatorSet,
}

impl<'a> BeaconDetector<'a> {
    pub fn new(config: &DetectionConfig, indicators: &'a IndicatorSet) -> Self {
        Self {
            analyzer: IntervalAnalyzer::from_config(config),
            classifier: Classifier::from_config(config),
            scorer: scorer_from_config(config),
            indicators,
        }
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        self.scorer.policy()
    }

    /// Analyzes every source host in `records`.
    ///
    /// Fails only on empty input, so callers can tell "nothing to analyze"
    /// apart from "nothing found".
    pub fn detect(&self, records: &[FlowRecord]) -> Result<DetectionOutcome, DetectionError> {
        if records.is_empty() {
            return Err(DetectionError::EmptyInput);
        }

        let mut outcome = DetectionOutcome::default();
        for session in group_sessions(records) {
            let (result, contacts) = self.analyze_session(&session);
            outcome.push(result, contacts);
        }

        info!(
            "Detection complete: {} sources, {} beaconing, {} insufficient, {} known C2 contacts without beaconing",
            outcome.results.len(),
            outcome.count_by_status(DetectionStatus::BeaconingDetected),
            outcome.count_by_status(DetectionStatus::InsufficientData),
            outcome.indicator_contacts.len()
        );

        Ok(outcome)
    }

    /// Classifies and scores one session.
    pub fn analyze_session(
        &self,
        session: &Session<'_>,
    ) -> (DetectionResult, Vec<IndicatorContactEvent>) {
        let stats = self.analyzer.analyze_timestamps(&session.timestamps());
        let status = self.classifier.classify(stats.as_ref());

        let destinations: BTreeSet<String> = session
            .records
            .iter()
            .filter_map(|r| r.destination_address.clone())
            .collect();
        let matched_indicators: BTreeSet<String> = destinations
            .iter()
            .filter(|d| self.indicators.contains(d))
            .cloned()
            .collect();

        let anomaly_score = stats
            .as_ref()
            .map(|s| self.scorer.score(s.dominant_gap, s.consistency_percent));

        match &stats {
            Some(s) => debug!(
                "{}: {} events, status={}, dominant_gap={}s, {}/{} consistent ({:.1}%), score={:?}",
                session.source_address,
                session.total_events(),
                status,
                s.dominant_gap,
                s.consistent_count,
                s.gaps.len(),
                s.consistency_percent,
                anomaly_score
            ),
            None => debug!(
                "{}: {} events, status={}",
                session.source_address,
                session.total_events(),
                status
            ),
        }

        let contacts = if status.is_beaconing() {
            Vec::new()
        } else {
            matched_indicators
                .iter()
                .map(|destination| IndicatorContactEvent {
                    source_address: session.source_address.to_string(),
                    destination_address: destination.clone(),
                    timestamps: session.timestamps_for(destination),
                })
                .collect()
        };

        let first = session.first_record();
        let result = DetectionResult {
            source_address: session.source_address.to_string(),
            total_events: session.total_events(),
            status,
            destinations,
            asset: first.and_then(|r| r.asset.clone()),
            user: first.and_then(|r| r.user.clone()),
            dominant_gap: stats.as_ref().map(|s| s.dominant_gap),
            consistency_percent: stats.as_ref().map(|s| s.consistency_percent),
            anomaly_score,
            start_time: session.start_time(),
            end_time: session.end_time(),
            is_known_indicator: !matched_indicators.is_empty(),
            matched_indicators,
        };

        (result, contacts)
    }
}
