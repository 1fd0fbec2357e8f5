//! Domain-specific error types for Beacon-Hunter.
//!
//! Uses `thiserror` for ergonomic error definitions that integrate
//! with the broader `anyhow` error handling strategy.

use thiserror::Error;

/// Errors raised by the detection engine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DetectionError {
    /// No records at all. Distinct from a run that found nothing.
    #[error("No flow records to analyze")]
    EmptyInput,
}

/// Errors that can occur while loading connection logs.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("No valid data found in input files")]
    NoData,

    #[error("Failed to parse CSV file '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read input directory '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors that can occur while refreshing the indicator list from the feed.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to open feed archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No JSON file found in feed archive")]
    MissingJson,

    #[error("Failed to parse feed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write indicator list: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
