//! Terminal and JSON rendering of a run report.

use std::fmt::Write as _;

use check_engine::{CheckOutcome, FindingKind, OverallStatus, RunReport};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

const WIDTH: usize = 62;
const NAME_WIDTH: usize = 24;
const MESSAGE_WIDTH: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    status: OverallStatus,
    #[serde(flatten)]
    report: &'a RunReport,
}

pub fn render(report: &RunReport, format: OutputFormat) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => render_json(report),
    }
}

pub fn render_json(report: &RunReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&JsonReport {
        status: report.summarize(),
        report,
    })
}

fn status_icon(outcome: &CheckOutcome) -> &'static str {
    match outcome {
        CheckOutcome::Completed(finding) => match finding.kind() {
            FindingKind::Ok => "✅",
            FindingKind::Warning => "⚠️ ",
            FindingKind::Error => "❌",
        },
        CheckOutcome::Failed(_) => "💥",
    }
}

/// Boxed summary table, one row per check in name order.
pub fn render_text(report: &RunReport) -> String {
    let rule = "═".repeat(WIDTH);
    let mut out = String::new();
    let _ = writeln!(out, "╔{rule}╗");
    let _ = writeln!(out, "║ {:<width$} ║", "VSPHERE PROBLEM DETECTOR REPORT", width = WIDTH - 2);
    let _ = writeln!(out, "╠{rule}╣");

    for (name, entry) in report.iter() {
        let _ = writeln!(
            out,
            "║ {} {:<NAME_WIDTH$} {:<MESSAGE_WIDTH$} {:>4}ms ║",
            status_icon(&entry.outcome),
            truncate(name, NAME_WIDTH),
            truncate(entry.outcome.message(), MESSAGE_WIDTH),
            entry.elapsed_ms.min(9999),
        );
    }

    let status = report.summarize();
    let healthy = report.count(OverallStatus::Healthy);
    let summary = format!("SUMMARY: {healthy}/{} checks passed, status {status}", report.len());
    let _ = writeln!(out, "╠{rule}╣");
    let _ = writeln!(out, "║ {:<width$} ║", summary, width = WIDTH - 2);
    let _ = writeln!(out, "╚{rule}╝");

    let verdict = match status {
        OverallStatus::Healthy => format!("{status}").green().bold(),
        OverallStatus::Degraded => format!("{status}").yellow().bold(),
        OverallStatus::Failing => format!("{status}").red().bold(),
    };
    let _ = writeln!(out, "Overall: {verdict}");

    for (name, entry) in report.iter().filter(|(_, entry)| !entry.outcome.is_ok()) {
        let _ = writeln!(out, "  {} {}", name.bold(), entry.outcome.message());
        if let Some(finding) = entry.outcome.finding() {
            for affected in finding.affected() {
                let _ = writeln!(out, "      - {affected}");
            }
        }
    }
    out
}

/// Truncate on a character boundary, marking the cut with an ellipsis.
fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use check_engine::{aggregate, CheckFailure, CheckRecord, FailureKind, Finding};
    use std::time::Duration;

    fn report() -> RunReport {
        aggregate(vec![
            CheckRecord {
                name: "CheckPVs".into(),
                outcome: CheckOutcome::Completed(Finding::ok("fine")),
                elapsed: Duration::from_millis(12),
            },
            CheckRecord {
                name: "CheckDefaultDatastore".into(),
                outcome: CheckOutcome::Completed(
                    Finding::warning("datastore LocalDS_0 is nearly full").with_affected(["LocalDS_0"]),
                ),
                elapsed: Duration::from_millis(40),
            },
            CheckRecord {
                name: "CheckHostVersions".into(),
                outcome: CheckOutcome::Failed(CheckFailure::new(FailureKind::Panicked, "boom")),
                elapsed: Duration::ZERO,
            },
        ])
    }

    #[test]
    fn test_text_lists_checks_and_problems() {
        colored::control::set_override(false);
        let text = render_text(&report());
        assert!(text.contains("CheckPVs"));
        assert!(text.contains("SUMMARY: 1/3 checks passed, status Failing"));
        assert!(text.contains("Overall: Failing"));
        assert!(text.contains("- LocalDS_0"));
    }

    #[test]
    fn test_json_carries_status_and_entries() {
        let json: serde_json::Value = serde_json::from_str(&render_json(&report()).unwrap()).unwrap();
        assert_eq!(json["status"], "Failing");
        assert_eq!(json["checks"]["CheckPVs"]["result"], "completed");
        assert_eq!(json["checks"]["CheckPVs"]["elapsed_ms"], 12);
        assert_eq!(json["checks"]["CheckHostVersions"]["kind"], "panicked");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("datastöre-with-a-long-name", 10), "datastö...");
    }
}
