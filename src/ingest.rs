//! CSV ingestion and normalization into [`FlowRecord`]s.
//!
//! Header names are trimmed, lowercased and snake_cased. The first column
//! whose name contains `time` is treated as the timestamp column. Cells that
//! fail to parse as a timestamp become `None` instead of failing the load.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::record::FlowRecord;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%d-%b-%Y %H:%M:%S",
];

/// Lists `*.csv` files in `dir`, sorted by path.
pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    Ok(files)
}

/// Loads and normalizes every readable file, optionally keeping a single source.
///
/// Missing or malformed files are logged and skipped; only a load where no
/// file yields any rows is an error.
pub fn load_csv_files(
    paths: &[PathBuf],
    source_filter: Option<&str>,
) -> Result<Vec<FlowRecord>, IngestError> {
    let mut all_records = Vec::new();
    let mut any_loaded = false;

    for path in paths {
        if !path.exists() {
            warn!("File not found: {}", path.display());
            continue;
        }

        match load_csv_file(path) {
            Ok(records) => {
                info!("Loaded {} records from {}", records.len(), path.display());
                any_loaded |= !records.is_empty();
                all_records.extend(records);
            }
            Err(e) => error!("Error reading {}: {}", path.display(), e),
        }
    }

    if !any_loaded {
        return Err(IngestError::NoData);
    }

    if let Some(source) = source_filter {
        all_records.retain(|r| r.source_address == source);
        debug!("{} records after filtering on source {}", all_records.len(), source);
    }

    Ok(all_records)
}

/// Loads one CSV file.
pub fn load_csv_file(path: &Path) -> Result<Vec<FlowRecord>, IngestError> {
    let to_error = |source: csv::Error| IngestError::Csv {
        path: path.display().to_string(),
        source,
    };

    let file = File::open(path).map_err(|e| to_error(csv::Error::from(e)))?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(to_error)?
        .iter()
        .map(normalize_header)
        .collect();
    let columns = ColumnMap::from_headers(&headers);

    let Some(source_col) = columns.source else {
        warn!("{} has no source_address column, skipping", path.display());
        return Ok(Vec::new());
    };

    let mut records = Vec::new();
    let mut unparsed_timestamps = 0usize;

    for (idx, row) in reader.records().enumerate() {
        let row = match row {
            Ok(r) => r,
            Err(e) => {
                debug!("{} row {} skipped: {}", path.display(), idx + 1, e);
                continue;
            }
        };

        let cell = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let Some(source_address) = cell(Some(source_col)) else {
            debug!("{} row {} has no source address", path.display(), idx + 1);
            continue;
        };

        let raw_timestamp = cell(columns.timestamp);
        let timestamp = raw_timestamp.as_deref().and_then(parse_timestamp);
        if raw_timestamp.is_some() && timestamp.is_none() {
            unparsed_timestamps += 1;
        }

        records.push(FlowRecord {
            source_address,
            destination_address: cell(columns.destination),
            timestamp,
            asset: cell(columns.asset),
            user: cell(columns.user),
        });
    }

    if unparsed_timestamps > 0 {
        warn!(
            "{}: {} timestamps could not be parsed",
            path.display(),
            unparsed_timestamps
        );
    }

    Ok(records)
}

/// `" Source Address "` -> `"source_address"`.
pub fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase().replace(' ', "_")
}

/// Column positions after header normalization.
#[derive(Debug, Default, PartialEq, Eq)]
struct ColumnMap {
    source: Option<usize>,
    destination: Option<usize>,
    timestamp: Option<usize>,
    asset: Option<usize>,
    user: Option<usize>,
}

impl ColumnMap {
    fn from_headers(headers: &[String]) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        Self {
            source: find("source_address"),
            destination: find("destination_address"),
            timestamp: headers.iter().position(|h| h.contains("time")),
            asset: find("asset"),
            user: find("user"),
        }
    }
}

/// Parses a timestamp cell. Offsets are dropped, keeping wall-clock time.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f %z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.naive_local());
        }
    }

    let naive = value.strip_suffix('Z').unwrap_or(value);
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(dt);
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(naive, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }

    if let Ok(epoch) = value.parse::<f64>() {
        if epoch.is_finite() && epoch >= 0.0 {
            let secs = epoch.trunc() as i64;
            let nanos = ((epoch - epoch.trunc()) * 1e9).round() as u32;
            return DateTime::from_timestamp(secs, nanos.min(999_999_999)).map(|dt| dt.naive_utc());
        }
    }

    None
}
