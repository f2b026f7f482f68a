//! Translation of a run report into operator status conditions.

use check_engine::{CheckOutcome, FailureKind, FindingKind, OverallStatus, RunReport};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

pub const AVAILABLE: &str = "Available";
pub const DEGRADED: &str = "Degraded";

fn condition_status(value: bool) -> String {
    let status = if value { "True" } else { "False" };
    status.to_string()
}

fn reason(outcome: &CheckOutcome) -> &'static str {
    match outcome {
        CheckOutcome::Completed(finding) => match finding.kind() {
            FindingKind::Ok => "AsExpected",
            FindingKind::Warning => "CheckWarning",
            FindingKind::Error => "CheckError",
        },
        CheckOutcome::Failed(failure) => match failure.kind {
            FailureKind::Error => "CheckFailed",
            FailureKind::NotFound => "ObjectNotFound",
            FailureKind::Timeout => "CheckTimedOut",
            FailureKind::Cancelled => "CheckCancelled",
            FailureKind::Panicked => "CheckPanicked",
        },
    }
}

/// One `<CheckName>Failed` condition per check, in check name order, then
/// `Available` and `Degraded` for the run as a whole.
pub fn to_conditions(
    report: &RunReport,
    now: &Time,
    observed_generation: Option<i64>,
) -> Vec<Condition> {
    let condition = |type_: String, value: bool, reason: &str, message: String| Condition {
        type_,
        status: condition_status(value),
        reason: reason.to_string(),
        message,
        last_transition_time: now.clone(),
        observed_generation,
    };

    let mut conditions: Vec<Condition> = report
        .iter()
        .map(|(name, entry)| {
            condition(
                format!("{name}Failed"),
                !entry.outcome.is_ok(),
                reason(&entry.outcome),
                entry.outcome.message().to_string(),
            )
        })
        .collect();

    let status = report.summarize();
    let failing = report.count(OverallStatus::Failing);
    let degraded = report.count(OverallStatus::Degraded);
    let (reason, message) = match status {
        OverallStatus::Healthy => ("AsExpected", format!("all {} checks passed", report.len())),
        OverallStatus::Degraded => (
            "ChecksDegraded",
            format!("{degraded} of {} checks reported warnings", report.len()),
        ),
        OverallStatus::Failing => (
            "ChecksFailing",
            format!("{failing} of {} checks failed", report.len()),
        ),
    };
    conditions.push(condition(
        AVAILABLE.to_string(),
        status != OverallStatus::Failing,
        reason,
        message.clone(),
    ));
    conditions.push(condition(
        DEGRADED.to_string(),
        status != OverallStatus::Healthy,
        reason,
        message,
    ));
    conditions
}
