//! ThreatFox feed refresh for the local known C2 list.
//!
//! The full export is a zip archive holding one JSON document shaped as
//! `{ "<ioc id>": [ { "ioc_type": "ip:port", "ioc_value": "1.2.3.4:443", .. } ] }`.
//! Only `ip` and `ip:port` indicators are kept, with the port stripped.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::indicators::IndicatorSet;

#[derive(Debug, Deserialize)]
struct FeedEntry {
    ioc_type: String,
    ioc_value: String,
}

/// Extracts IP indicators from a ThreatFox zip export.
pub fn extract_indicators(archive_bytes: &[u8]) -> Result<IndicatorSet, FeedError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(archive_bytes))?;

    let json_name = archive
        .file_names()
        .find(|name| name.ends_with(".json"))
        .map(str::to_string)
        .ok_or(FeedError::MissingJson)?;
    debug!("Reading {} from feed archive", json_name);

    let mut data = Vec::new();
    archive.by_name(&json_name)?.read_to_end(&mut data)?;

    parse_feed_json(&data)
}

/// Parses the feed JSON document.
pub fn parse_feed_json(data: &[u8]) -> Result<IndicatorSet, FeedError> {
    let feed: HashMap<String, Vec<FeedEntry>> = serde_json::from_slice(data)?;

    Ok(feed
        .values()
        .flatten()
        .filter(|entry| matches!(entry.ioc_type.as_str(), "ip" | "ip:port"))
        .map(|entry| strip_port(&entry.ioc_value))
        .collect())
}

/// `"1.2.3.4:443"` -> `"1.2.3.4"`.
fn strip_port(value: &str) -> &str {
    value.split(':').next().unwrap_or(value)
}

/// Downloads the feed and replaces the list at `path`.
///
/// The new list is written next to the old one and renamed over it only
/// after a successful parse, so any failure leaves the previous list intact.
pub async fn update_indicator_list(config: &FeedConfig, path: &Path) -> Result<usize, FeedError> {
    info!("Downloading ThreatFox export from {}", config.url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    let bytes = client
        .get(&config.url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    debug!("Downloaded {} bytes", bytes.len());

    let indicators = extract_indicators(&bytes)?;
    write_atomically(&indicators, path)?;

    info!("C2 list updated with {} IPs", indicators.len());
    Ok(indicators.len())
}

fn write_atomically(indicators: &IndicatorSet, path: &Path) -> Result<(), FeedError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = Path::new(&tmp);

    indicators.save(tmp)?;
    std::fs::rename(tmp, path)?;
    Ok(())
}
