// Report generation from a monitoring session

use crate::monitor::TrafficMonitor;
use crate::stats::{HostStats, SessionTotals};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub monitoring: bool,
    pub totals: SessionTotals,
    pub hosts: Vec<HostStats>,
    pub domains: Vec<String>,
}

pub fn gather_report_data(monitor: &TrafficMonitor) -> ReportData {
    ReportData {
        generated_at: Utc::now(),
        monitoring: monitor.is_monitoring(),
        totals: monitor.totals(),
        hosts: monitor.host_stats(),
        domains: monitor.domains(),
    }
}

pub fn generate_report(
    data: &ReportData,
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    match format {
        ReportFormat::Text => Ok(generate_text_report(data)),
        ReportFormat::Json => generate_json_report(data),
        ReportFormat::Csv => Ok(generate_csv_report(data)),
        ReportFormat::Markdown => Ok(generate_markdown_report(data)),
    }
}

fn format_kilobytes(bytes: u64) -> String {
    format!("{:.1} KB", bytes as f64 / 1024.0)
}

fn format_source_kinds(host: &HostStats) -> String {
    host.source_kinds
        .iter()
        .map(|kind| kind.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                         FLOWMAP TRAFFIC REPORT\n");
    report.push_str(RULE);
    report.push('\n');

    report.push_str(&format!(
        "Generated:    {}\n",
        data.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let status = if data.monitoring { "monitoring".green() } else { "stopped".red() };
    report.push_str(&format!("Status:       {}\n", status));
    report.push_str(&format!("Servers:      {}\n", data.totals.destination_count));
    report.push_str(&format!("Requests:     {}\n", data.totals.request_count));
    report.push_str(&format!("Services:     {}\n", data.totals.category_count));
    report.push_str(&format!(
        "Transferred:  {}\n",
        format_kilobytes(data.totals.total_transfer_bytes)
    ));
    if data.totals.dropped_observations > 0 {
        report.push_str(&format!(
            "Dropped:      {} (no destination host)\n",
            data.totals.dropped_observations.to_string().yellow()
        ));
    }
    report.push('\n');

    if !data.hosts.is_empty() {
        report.push_str(RULE);
        report.push_str("CONNECTIONS\n");
        report.push_str(RULE);
        report.push('\n');

        for host in &data.hosts {
            report.push_str(&format!(
                "{} {}  {}\n",
                host.service.icon,
                host.service.name.bold(),
                host.hostname.cyan()
            ));
            report.push_str(&format!(
                "    {} requests, {:.2}ms avg, {}, via {}\n",
                host.request_count,
                host.mean_duration_ms,
                format_kilobytes(host.total_bytes),
                format_source_kinds(host)
            ));
        }
        report.push('\n');
    }

    if !data.domains.is_empty() {
        report.push_str(RULE);
        report.push_str("DOMAINS\n");
        report.push_str(RULE);
        report.push('\n');
        report.push_str(&format!("  {}\n\n", data.domains.join("  ")));
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(data)
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

pub fn generate_csv_report(data: &ReportData) -> String {
    let mut csv = String::from(
        "hostname,service,category,detected_by,requests,mean_ms,total_bytes,source_kinds\n",
    );
    for host in &data.hosts {
        csv.push_str(&format!(
            "{},{},{},{},{},{:.2},{},{}\n",
            csv_field(&host.hostname),
            csv_field(&host.service.name),
            host.service.category,
            host.service.detected_by.as_str(),
            host.request_count,
            host.mean_duration_ms,
            host.total_bytes,
            csv_field(&format_source_kinds(host)),
        ));
    }
    csv
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut md = String::from("# Flowmap Traffic Report\n\n");
    md.push_str(&format!(
        "- **Servers:** {}\n- **Requests:** {}\n- **Services:** {}\n- **Transferred:** {}\n\n",
        data.totals.destination_count,
        data.totals.request_count,
        data.totals.category_count,
        format_kilobytes(data.totals.total_transfer_bytes)
    ));

    if !data.hosts.is_empty() {
        md.push_str("| Service | Host | Requests | Avg | Size | Kinds |\n");
        md.push_str("|---|---|---:|---:|---:|---|\n");
        for host in &data.hosts {
            md.push_str(&format!(
                "| {} {} | `{}` | {} | {:.2}ms | {} | {} |\n",
                host.service.icon,
                host.service.name,
                host.hostname,
                host.request_count,
                host.mean_duration_ms,
                format_kilobytes(host.total_bytes),
                format_source_kinds(host)
            ));
        }
        md.push('\n');
    }
    md
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}
