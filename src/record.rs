//! Canonical connection record shared by the loader and the detection engine.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single normalized outbound connection.
///
/// Timestamps are timezone-naive wall-clock instants. A timestamp that could
/// not be parsed at load time is `None` rather than an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source_address: String,
    pub destination_address: Option<String>,
    pub timestamp: Option<NaiveDateTime>,
    pub asset: Option<String>,
    pub user: Option<String>,
}

#[cfg(test)]
impl FlowRecord {
    pub fn new(source_address: impl Into<String>) -> Self {
        Self {
            source_address: source_address.into(),
            destination_address: None,
            timestamp: None,
            asset: None,
            user: None,
        }
    }

    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination_address = Some(destination.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_asset(mut self, asset: impl Into<String>) -> Self {
        self.asset = Some(asset.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }
}
