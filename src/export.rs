//! Export Module
//!
//! Renders detection outcomes: the JSON and HTML report artifacts, the
//! console summary, and stdout output in text/json/jsonl formats.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use crate::detector::{DetectionOutcome, DetectionResult, IndicatorContactEvent};
use crate::error::Result;

/// Output format for stdout rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonLines, // One JSON object per line (JSONL)
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "jsonl" | "jsonlines" => Ok(Self::JsonLines),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
            Self::JsonLines => write!(f, "jsonl"),
        }
    }
}

/// One row of the beaconing report table.
#[derive(Debug, Serialize)]
pub struct ReportRow {
    #[serde(rename = "Source IP")]
    pub source_ip: String,
    #[serde(rename = "Destination IPs")]
    pub destination_ips: Vec<String>,
    #[serde(rename = "Asset")]
    pub asset: Option<String>,
    #[serde(rename = "User")]
    pub user: Option<String>,
    #[serde(rename = "Interval (s)")]
    pub interval_secs: Option<f64>,
    #[serde(rename = "Consistency (%)")]
    pub consistency_percent: Option<f64>,
    #[serde(rename = "Anomaly Score")]
    pub anomaly_score: Option<f64>,
    #[serde(rename = "Start Time")]
    pub start_time: Option<String>,
    #[serde(rename = "End Time")]
    pub end_time: Option<String>,
    #[serde(rename = "Total Events")]
    pub total_events: usize,
    #[serde(rename = "C2 Match")]
    pub c2_match: Vec<String>,
}

impl From<&DetectionResult> for ReportRow {
    fn from(result: &DetectionResult) -> Self {
        Self {
            source_ip: result.source_address.clone(),
            destination_ips: result.destinations.iter().cloned().collect(),
            asset: result.asset.clone(),
            user: result.user.clone(),
            interval_secs: result.dominant_gap.map(|g| round_to(g, 2)),
            consistency_percent: result.consistency_percent.map(|c| round_to(c, 1)),
            anomaly_score: result.anomaly_score,
            start_time: result.start_time.map(format_time),
            end_time: result.end_time.map(format_time),
            total_events: result.total_events,
            c2_match: result.matched_indicators.iter().cloned().collect(),
        }
    }
}

/// Beaconing rows only, in processing order.
pub fn beaconing_rows(outcome: &DetectionOutcome) -> Vec<ReportRow> {
    outcome.beaconing().map(ReportRow::from).collect()
}

/// First connection per (source, destination) pair, in event order.
pub fn contact_summary(contacts: &[IndicatorContactEvent]) -> Vec<(&str, &str, Option<NaiveDateTime>)> {
    let mut summary: Vec<(&str, &str, Option<NaiveDateTime>)> = Vec::new();
    for event in contacts {
        let key = (event.source_address.as_str(), event.destination_address.as_str());
        match summary.iter_mut().find(|(s, d, _)| (*s, *d) == key) {
            Some(entry) => entry.2 = event.first_contact(),
            None => summary.push((key.0, key.1, event.first_contact())),
        }
    }
    summary
}

/// Paths of the report files written for one run.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub html: PathBuf,
}

/// Writes the JSON and HTML artifacts into `output_dir`.
///
/// `generated_at` names the files and titles the HTML page.
pub fn write_reports(
    outcome: &DetectionOutcome,
    output_dir: &Path,
    generated_at: DateTime<Local>,
) -> Result<ReportPaths> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    let stamp = generated_at.format("%Y%m%d_%H%M%S").to_string();
    let paths = ReportPaths {
        json: output_dir.join(format!("beaconing_report_{}.json", stamp)),
        html: output_dir.join(format!("beaconing_report_{}.html", stamp)),
    };

    let rows = beaconing_rows(outcome);
    let json = serde_json::to_string_pretty(&rows).context("Failed to serialize report")?;
    std::fs::write(&paths.json, json)
        .with_context(|| format!("Failed to write {}", paths.json.display()))?;

    let html = render_html(&rows, &outcome.indicator_contacts, &stamp);
    std::fs::write(&paths.html, html)
        .with_context(|| format!("Failed to write {}", paths.html.display()))?;

    Ok(paths)
}

/// Exports an outcome in the specified stdout format
pub fn export_outcome(outcome: &DetectionOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => export_text(outcome),
        OutputFormat::Json => export_json(outcome),
        OutputFormat::JsonLines => export_jsonl(outcome),
    }
}

/// Exports the full outcome, every status included, as pretty-printed JSON
pub fn export_json(outcome: &DetectionOutcome) -> String {
    serde_json::to_string_pretty(outcome).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Exports the outcome as JSON Lines (summary, then one result per line)
pub fn export_jsonl(outcome: &DetectionOutcome) -> String {
    let mut lines = Vec::new();

    let summary = serde_json::json!({
        "type": "summary",
        "sources": outcome.results.len(),
        "beaconing_count": outcome.beaconing().count(),
        "indicator_contacts": outcome.indicator_contacts.len(),
    });
    lines.push(serde_json::to_string(&summary).unwrap_or_default());

    for result in &outcome.results {
        if let Ok(line) = serde_json::to_string(result) {
            lines.push(line);
        }
    }
    for contact in &outcome.indicator_contacts {
        let line = serde_json::json!({ "type": "indicator_contact", "contact": contact });
        lines.push(line.to_string());
    }

    lines.join("\n")
}

/// Console summary: beaconing sources, then known C2 contacts without beaconing
pub fn export_text(outcome: &DetectionOutcome) -> String {
    let mut output = String::from("\nBeaconing Detection Summary:\n");
    let beaconing: Vec<&DetectionResult> = outcome.beaconing().collect();

    if beaconing.is_empty() {
        output.push_str("No beaconing detected or not enough data to determine patterns.\n");
    }

    for result in beaconing {
        let _ = writeln!(output, "\nSource IP:        {}", result.source_address);
        let _ = writeln!(output, "Destination IPs:  {}", join(&result.destinations));
        let _ = writeln!(
            output,
            "Asset/User:       [{},{}]",
            result.asset.as_deref().unwrap_or(""),
            result.user.as_deref().unwrap_or("")
        );
        let _ = writeln!(
            output,
            "Interval:         {}s ({}% consistent)",
            format_opt(result.dominant_gap.map(|g| round_to(g, 2))),
            format_opt(result.consistency_percent.map(|c| round_to(c, 1)))
        );
        let _ = writeln!(
            output,
            "Anomaly Score:    {} [{}]",
            format_opt(result.anomaly_score),
            result.status.severity()
        );
        if result.is_known_indicator {
            let _ = writeln!(
                output,
                "!! Matches Known C2 IPs: {}",
                join(&result.matched_indicators)
            );
        }
        let _ = writeln!(
            output,
            "Timeframe:        {} to {}",
            format_opt_time(result.start_time),
            format_opt_time(result.end_time)
        );
    }

    let summary = contact_summary(&outcome.indicator_contacts);
    if !summary.is_empty() {
        output.push_str("\nKnown C2 IPs contacted without beaconing:\n");
        let _ = writeln!(output, "{:<20}{:<20}FIRST CONNECTION", "SOURCE", "DESTINATION");
        output.push_str(&"-".repeat(65));
        output.push('\n');
        for (src, dst, first) in summary {
            let _ = writeln!(output, "{:<20}{:<20}{}", src, dst, format_opt_time(first));
        }
    }

    output
}

const HTML_STYLE: &str = r#"
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background-color: #f0f2f5; color: #333; padding: 30px; }
        h2 { text-align: center; color: #1a237e; }
        h3.c2 { color: #d32f2f; text-align: center; margin-top: 40px; }
        .styled { width: 95%; margin: 20px auto; border-collapse: collapse; box-shadow: 0 2px 8px rgba(0,0,0,0.1); }
        .styled th { background-color: #3f51b5; color: white; padding: 10px; font-size: 14px; }
        .styled td { padding: 10px; border: 1px solid #ccc; font-size: 13px; background-color: #fff; }
        .styled tr:nth-child(even) td { background-color: #f9f9f9; }
        a { color: #0073e6; text-decoration: none; }
        a:hover { text-decoration: underline; }
"#;

const HTML_COLUMNS: [&str; 11] = [
    "Source IP",
    "Destination IPs",
    "Asset",
    "User",
    "Interval (s)",
    "Consistency (%)",
    "Anomaly Score",
    "Start Time",
    "End Time",
    "Total Events",
    "C2 Match",
];

/// Renders the HTML report page.
pub fn render_html(rows: &[ReportRow], contacts: &[IndicatorContactEvent], stamp: &str) -> String {
    let mut html = String::new();
    let _ = write!(
        html,
        "<html>\n<head>\n    <meta charset=\"utf-8\">\n    <style>{}</style>\n</head>\n<body>\n    <h2>Beaconing Detection Report - {}</h2>\n",
        HTML_STYLE,
        escape_html(stamp)
    );

    html.push_str("    <table class='styled'>\n        <thead><tr>");
    for column in HTML_COLUMNS {
        let _ = write!(html, "<th>{}</th>", escape_html(column));
    }
    html.push_str("</tr></thead>\n        <tbody>\n");
    for row in rows {
        let cells = [
            escape_html(&row.source_ip),
            link_list(&row.destination_ips, "Unknown"),
            escape_html(row.asset.as_deref().unwrap_or("")),
            escape_html(row.user.as_deref().unwrap_or("")),
            format_opt(row.interval_secs),
            format_opt(row.consistency_percent),
            format_opt(row.anomaly_score),
            escape_html(row.start_time.as_deref().unwrap_or("")),
            escape_html(row.end_time.as_deref().unwrap_or("")),
            row.total_events.to_string(),
            link_list(&row.c2_match, ""),
        ];
        html.push_str("            <tr>");
        for cell in cells {
            let _ = write!(html, "<td>{}</td>", cell);
        }
        html.push_str("</tr>\n");
    }
    html.push_str("        </tbody>\n    </table>\n");

    let summary = contact_summary(contacts);
    if !summary.is_empty() {
        html.push_str("    <h3 class='c2'>Known C2 IPs Contacted Without Beaconing</h3>\n");
        html.push_str("    <table class='styled'>\n        <thead><tr><th>Source</th><th>Destination</th><th>First Connection</th></tr></thead>\n        <tbody>\n");
        for (src, dst, first) in summary {
            let _ = writeln!(
                html,
                "            <tr><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape_html(src),
                osint_link(dst),
                escape_html(&format_opt_time(first))
            );
        }
        html.push_str("        </tbody>\n    </table>\n");
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn osint_link(ip: &str) -> String {
    let ip = escape_html(ip);
    format!("<a href='../OSINT.HTML?ip={0}' target='_blank'>{0}</a>", ip)
}

fn link_list(ips: &[String], empty: &str) -> String {
    if ips.is_empty() {
        return escape_html(empty);
    }
    ips.iter().map(|ip| osint_link(ip)).collect::<Vec<_>>().join("<br>")
}

/// Escapes text for HTML element and single/double-quoted attribute content
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

fn format_time(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_opt_time(ts: Option<NaiveDateTime>) -> String {
    ts.map(format_time).unwrap_or_else(|| "Unknown".to_string())
}

fn format_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
