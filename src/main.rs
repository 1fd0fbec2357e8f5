//! Beacon-Hunter: C2 beaconing detection over historical connection logs.
//!
//! Loads CSV connection logs, groups them per source host and looks for a
//! dominant, regular inter-arrival interval. Destinations are also matched
//! against a local list of known C2 IPs refreshed from ThreatFox.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   ingest    │────>│   detector   │────>│   export    │
//! │   (csv)     │     │ (no I/O)     │     │ (json/html) │
//! └─────────────┘     └──────────────┘     └─────────────┘
//!                            ^
//!                     ┌──────┴──────┐
//!                     │ indicators  │<──── feed (ThreatFox)
//!                     └─────────────┘
//! ```
//!
//! - **ingest**: Normalizes heterogeneous CSV files into flow records
//! - **detector**: Session grouping, interval analysis, classification, scoring
//! - **export**: JSON/HTML artifacts and the console summary

mod analyzer;
mod classifier;
mod config;
mod detector;
mod error;
mod export;
mod feed;
mod indicators;
mod ingest;
mod record;
mod scorer;
mod session;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::detector::BeaconDetector;
use crate::error::{DetectionError, IngestError};
use crate::export::{export_outcome, write_reports, OutputFormat};
use crate::indicators::IndicatorSet;
use crate::ingest::{discover_csv_files, load_csv_files};
use crate::scorer::ScoringPolicy;

/// Beacon-Hunter: C2 beaconing detection through connection-log analysis.
#[derive(Parser, Debug)]
#[command(name = "beacon-hunter")]
#[command(version = "0.1.0")]
#[command(about = "Detect C2 beaconing in connection logs and flag known C2 destinations")]
#[command(long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (writes to stderr).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze every CSV in the input directory (default).
    Detect(DetectArgs),

    /// Refresh the known C2 list from the ThreatFox export.
    #[command(name = "update-c2-list", alias = "updatec2list")]
    UpdateC2List {
        /// Indicator list to overwrite.
        #[arg(short, long)]
        indicators: Option<PathBuf>,
    },

    /// Print a default configuration file.
    GenerateConfig,
}

#[derive(clap::Args, Debug, Default)]
struct DetectArgs {
    /// Directory containing CSV connection logs.
    #[arg(short, long)]
    input_dir: Option<PathBuf>,

    /// Directory reports are written to.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Known C2 indicator list.
    #[arg(long)]
    indicators: Option<PathBuf>,

    /// Only analyze this source address.
    #[arg(short, long)]
    source: Option<String>,

    /// Anomaly scoring policy: ratio, weighted.
    #[arg(long)]
    scoring: Option<ScoringPolicy>,

    /// Stdout format: text, json, jsonl.
    #[arg(long)]
    output: Option<OutputFormat>,

    /// Skip writing JSON/HTML report files.
    #[arg(long)]
    no_reports: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    let config = Config::load_or_default(cli.config.as_deref());

    match cli.command {
        Some(Commands::UpdateC2List { indicators }) => {
            let path = indicators.unwrap_or_else(|| PathBuf::from(&config.paths.indicator_list));
            run_update(&config, &path).await
        }
        Some(Commands::GenerateConfig) => {
            println!("{}", Config::generate_default());
            Ok(())
        }
        Some(Commands::Detect(args)) => run_detect(config, args),
        None => run_detect(config, DetectArgs::default()),
    }
}

async fn run_update(config: &Config, path: &Path) -> Result<()> {
    config.validate()?;
    println!("Downloading ThreatFox ZIP archive...");

    match feed::update_indicator_list(&config.feed, path).await {
        Ok(count) => println!("C2 list updated with {} IPs.", count),
        Err(e) => {
            // The previous list is left in place
            error!("Failed to update C2 list: {}", e);
            println!("Failed to update C2 list: {}", e);
        }
    }
    Ok(())
}

fn run_detect(mut config: Config, args: DetectArgs) -> Result<()> {
    if let Some(dir) = &args.input_dir {
        config.paths.input_dir = dir.display().to_string();
    }
    if let Some(dir) = &args.output_dir {
        config.paths.output_dir = dir.display().to_string();
    }
    if let Some(path) = &args.indicators {
        config.paths.indicator_list = path.display().to_string();
    }
    if let Some(scoring) = args.scoring {
        config.detection.scoring = scoring;
    }
    if let Some(format) = args.output {
        config.output.format = format;
    }
    if args.no_reports {
        config.output.write_reports = false;
    }
    config.validate()?;

    let input_dir = Path::new(&config.paths.input_dir);
    let files = match discover_csv_files(input_dir) {
        Ok(files) => files,
        Err(e) => {
            warn!("{}", e);
            Vec::new()
        }
    };
    if files.is_empty() {
        println!("No CSV files found in the '{}' folder.", input_dir.display());
        return Ok(());
    }

    let records = match load_csv_files(&files, args.source.as_deref()) {
        Ok(records) => records,
        Err(IngestError::NoData) => {
            println!("No valid data found in input files.");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let indicators = match IndicatorSet::load(Path::new(&config.paths.indicator_list)) {
        Ok(indicators) => indicators,
        Err(e) => {
            // Beaconing analysis does not depend on the list
            error!("{:#}", e);
            println!("Could not load the known C2 list, continuing without it: {:#}", e);
            IndicatorSet::new()
        }
    };
    if indicators.is_empty() {
        warn!("No known C2 indicators loaded; run update-c2-list to fetch them");
    }
    let detector = BeaconDetector::new(&config.detection, &indicators);
    info!(
        "Analyzing {} records with {} scoring",
        records.len(),
        detector.scoring_policy()
    );

    let outcome = match detector.detect(&records) {
        Ok(outcome) => outcome,
        Err(DetectionError::EmptyInput) => {
            match &args.source {
                Some(source) => println!("No records found for source {}.", source),
                None => println!("No records to analyze."),
            }
            return Ok(());
        }
    };

    println!("{}", export_outcome(&outcome, config.output.format));

    if config.output.write_reports {
        let output_dir = Path::new(&config.paths.output_dir);
        let paths = write_reports(&outcome, output_dir, chrono::Local::now())?;
        info!("Wrote {} and {}", paths.json.display(), paths.html.display());
        let shown = std::fs::canonicalize(output_dir).unwrap_or_else(|_| output_dir.to_path_buf());
        println!("\nReports saved to: {}", shown.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_command() {
        let cli = Cli::parse_from(["beacon-hunter"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_update_alias() {
        let cli = Cli::parse_from(["beacon-hunter", "updatec2list"]);
        assert!(matches!(cli.command, Some(Commands::UpdateC2List { .. })));
    }

    #[test]
    fn test_cli_detect_overrides() {
        let cli = Cli::parse_from([
            "beacon-hunter",
            "detect",
            "--scoring",
            "weighted",
            "--output",
            "json",
            "--source",
            "10.0.0.1",
        ]);
        let Some(Commands::Detect(args)) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(args.scoring, Some(ScoringPolicy::Weighted));
        assert_eq!(args.output, Some(OutputFormat::Json));
        assert_eq!(args.source.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_detect_missing_input_dir_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let args = DetectArgs {
            input_dir: Some(dir.path().join("CSVs")),
            no_reports: true,
            ..DetectArgs::default()
        };
        assert!(run_detect(Config::default(), args).is_ok());
    }

    fn write_beacon_csv(dir: &Path) -> PathBuf {
        let input = dir.join("CSVs");
        std::fs::create_dir(&input).unwrap();
        let mut csv = String::from("source_address,destination_address,timestamp,asset,user\n");
        for i in 0..6 {
            csv.push_str(&format!(
                "10.0.0.5,203.0.113.9,2024-01-15 10:{:02}:00,WS-01,alice\n",
                i
            ));
        }
        std::fs::write(input.join("fw.csv"), csv).unwrap();
        input
    }

    #[test]
    fn test_detect_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_beacon_csv(dir.path());

        let output = dir.path().join("OUTPUT");
        let args = DetectArgs {
            input_dir: Some(input),
            output_dir: Some(output.clone()),
            indicators: Some(dir.path().join("known_c2_list.txt")),
            ..DetectArgs::default()
        };

        run_detect(Config::default(), args).unwrap();

        let written: Vec<_> = std::fs::read_dir(&output).unwrap().collect();
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn test_detect_continues_with_unreadable_indicator_list() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_beacon_csv(dir.path());
        // A directory where the list should be cannot be read at all
        let list = dir.path().join("known_c2_list.txt");
        std::fs::create_dir(&list).unwrap();

        let output = dir.path().join("OUTPUT");
        let args = DetectArgs {
            input_dir: Some(input),
            output_dir: Some(output.clone()),
            indicators: Some(list),
            ..DetectArgs::default()
        };

        run_detect(Config::default(), args).unwrap();

        let written: Vec<_> = std::fs::read_dir(&output).unwrap().collect();
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn test_detect_with_non_utf8_indicator_list() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_beacon_csv(dir.path());
        let list = dir.path().join("known_c2_list.txt");
        std::fs::write(&list, b"1.2.3.4\n\xff\xfe\n").unwrap();

        let args = DetectArgs {
            input_dir: Some(input),
            indicators: Some(list),
            no_reports: true,
            ..DetectArgs::default()
        };

        assert!(run_detect(Config::default(), args).is_ok());
    }
}
